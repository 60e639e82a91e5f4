use crate::api::AppState;
use crate::api::schemas::messaging::{CreateMessageRequest, CreateMessageResponse, MessageResponse};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

/// Stores a new message and returns its retrieval link.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is not valid JSON.
/// Returns `AppError::Validation` if the content is empty or too long.
pub async fn create_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let origin = request_origin(&headers, state.public_url.as_deref());
    let created = state.message_service.create_message(&request.content, &origin).await?;

    Ok((StatusCode::CREATED, Json(CreateMessageResponse::from(created))))
}

/// Returns a live message.
///
/// # Errors
/// Returns `AppError::Validation` if the id is malformed.
/// Returns `AppError::NotFound` if the message does not exist or has expired.
pub async fn get_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MessageResponse>> {
    let message = state.message_service.fetch_message(&id).await?;
    Ok(Json(message.into()))
}

/// `GET /api/message/` with nothing after the slash. Answered as a malformed id.
///
/// # Errors
/// Always returns `AppError::Validation`.
pub async fn get_message_without_id(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    let message = state.message_service.fetch_message("").await?;
    Ok(Json(message.into()))
}

/// The externally visible base address: the configured public URL, or one
/// rebuilt from the forwarded scheme and the Host header.
fn request_origin(headers: &HeaderMap, public_url: Option<&str>) -> String {
    if let Some(url) = public_url {
        return url.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or("http", str::trim);
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("localhost");

    format!("{scheme}://{host}")
}
