use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, SendMessageRequest};

use crate::delivery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/messages/{peer_id}: the caller's conversation with `peer_id`.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let messages = delivery::read_conversation(&state, claims.sub, peer_id).await?;
    Ok(Json(messages))
}

/// POST /api/messages/send/{peer_id}
pub async fn send_message(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.is_empty() {
        return Err(ApiError::BadRequest("Message needs text or an image".into()));
    }

    let message = delivery::send_direct_message(&state, claims.sub, peer_id, req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
