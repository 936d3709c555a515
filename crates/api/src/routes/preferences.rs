//! User preference routes.

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};

use courier_common::error::AppError;
use courier_common::types::Preferences;
use courier_engine::preferences::{PreferenceStore, UpdatePreferencesParams};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{user_id}/preferences", get(get_preferences))
        .route("/users/{user_id}/preferences", put(update_preferences))
}

/// GET /users/:user_id/preferences — Read (and lazily create) preferences.
async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Preferences>, AppError> {
    let prefs = PreferenceStore::get_or_create(&state.pool, &user_id).await?;
    Ok(Json(prefs))
}

/// PUT /users/:user_id/preferences — Partial update; only supplied fields
/// change. Priorities outside [1..4] are rejected at deserialization.
async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(params): Json<UpdatePreferencesParams>,
) -> Result<Json<Preferences>, AppError> {
    let prefs = PreferenceStore::update(&state.pool, &user_id, &params).await?;
    Ok(Json(prefs))
}
