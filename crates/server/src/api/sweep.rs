use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;

use super::schemas::{ErrorResponse, SweepResponse};
use super::{AppState, require_admin_secret};
use crate::error::ServerError;

/// `POST /v1/sweep` -- run one reclamation pass now.
#[utoipa::path(
    post,
    path = "/v1/sweep",
    tag = "Reclamation",
    summary = "Run the sweeper",
    description = "Deletes the blobs of expired, exhausted, or deactivated items and marks them removed. Requires the `x-cleanup-secret` header.",
    responses(
        (status = 200, description = "Sweep report", body = SweepResponse),
        (status = 401, description = "Missing or wrong secret", body = ErrorResponse),
        (status = 503, description = "Metadata store unavailable", body = ErrorResponse)
    )
)]
pub async fn sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServerError> {
    require_admin_secret(&state, &headers)?;
    let report = state.broker.sweep().await?;
    Ok((StatusCode::OK, Json(SweepResponse::from(report))))
}
