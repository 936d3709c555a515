//! Per-user preference store.
//!
//! Rows are created lazily with the column defaults on first read. The
//! `INSERT .. ON CONFLICT DO NOTHING` + read-back sequence makes creation
//! idempotent under races: the loser of a concurrent insert reads the
//! winner's row. Updates are right-biased partial merges on `user_id`.

use serde::Deserialize;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{Preferences, Priority};

/// Service layer for preference rows.
pub struct PreferenceStore;

/// Partial update: only supplied fields overwrite.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesParams {
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub whatsapp_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub email_priority: Option<Priority>,
    pub sms_priority: Option<Priority>,
    pub whatsapp_priority: Option<Priority>,
    pub push_priority: Option<Priority>,
}

impl PreferenceStore {
    /// Return the stored row, creating defaults if the user is unknown.
    pub async fn get_or_create(pool: &PgPool, user_id: &str) -> Result<Preferences, AppError> {
        let inserted = sqlx::query("INSERT INTO preferences (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(pool)
            .await?;

        if inserted.rows_affected() > 0 {
            tracing::debug!(user_id, "Default preferences created");
        }

        let prefs: Preferences = sqlx::query_as("SELECT * FROM preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

        Ok(prefs)
    }

    /// Upsert with a partial merge; unspecified fields keep their stored
    /// (or default) values. Returns the resulting full row.
    pub async fn update(
        pool: &PgPool,
        user_id: &str,
        params: &UpdatePreferencesParams,
    ) -> Result<Preferences, AppError> {
        // Lazy create first so the partial update always has a base row
        Self::get_or_create(pool, user_id).await?;

        let prefs: Preferences = sqlx::query_as(
            r#"
            UPDATE preferences
            SET email_enabled = COALESCE($2, email_enabled),
                sms_enabled = COALESCE($3, sms_enabled),
                whatsapp_enabled = COALESCE($4, whatsapp_enabled),
                push_enabled = COALESCE($5, push_enabled),
                email_priority = COALESCE($6, email_priority),
                sms_priority = COALESCE($7, sms_priority),
                whatsapp_priority = COALESCE($8, whatsapp_priority),
                push_priority = COALESCE($9, push_priority),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(params.email_enabled)
        .bind(params.sms_enabled)
        .bind(params.whatsapp_enabled)
        .bind(params.push_enabled)
        .bind(params.email_priority)
        .bind(params.sms_priority)
        .bind(params.whatsapp_priority)
        .bind(params.push_priority)
        .fetch_one(pool)
        .await?;

        tracing::info!(user_id, "Preferences updated");

        Ok(prefs)
    }
}
