//! Notification submission routes.
//!
//! Validation happens here, at the boundary; the engine consumes
//! already-validated values (and still defends against the basics).

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Channel, Priority};
use courier_engine::dispatcher::{BulkReceipt, SubmitRequest};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/send", post(send_notification))
        .route("/notifications/send-bulk", post(send_bulk))
}

#[derive(Debug, Deserialize)]
pub struct BulkSendRequest {
    pub notifications: Vec<SubmitRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub transaction_id: Uuid,
    pub message: String,
    pub channel: Channel,
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendResponse {
    pub success: bool,
    #[serde(flatten)]
    pub receipt: BulkReceipt,
}

/// POST /notifications/send — Queue a single notification for delivery.
async fn send_notification(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SendResponse>), AppError> {
    validate_request(&request)?;

    let receipt = state.dispatcher.submit(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendResponse {
            success: true,
            transaction_id: receipt.transaction_id,
            message: "Notification queued for delivery".to_string(),
            channel: receipt.channel,
            priority: receipt.priority,
        }),
    ))
}

/// POST /notifications/send-bulk — Queue many notifications. Per-item
/// failures land in `results`; the response is 202 regardless.
async fn send_bulk(
    State(state): State<AppState>,
    Json(request): Json<BulkSendRequest>,
) -> Result<(StatusCode, Json<BulkSendResponse>), AppError> {
    if request.notifications.is_empty() {
        return Err(AppError::Validation("notifications must not be empty".to_string()));
    }
    for item in &request.notifications {
        validate_request(item)?;
    }

    let receipt = state.dispatcher.submit_bulk(request.notifications).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(BulkSendResponse { success: receipt.failed == 0, receipt }),
    ))
}

fn validate_request(request: &SubmitRequest) -> Result<(), AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }
    if request.content.trim().is_empty() {
        return Err(AppError::Validation("content is required".to_string()));
    }
    if request.recipient.trim().is_empty() {
        return Err(AppError::Validation("recipient is required".to_string()));
    }
    Ok(())
}
