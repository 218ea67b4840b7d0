use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use ephemera_broker::{BrokerError, IngestRequest};
use ephemera_core::{ItemId, ValidationError};

use super::schemas::{DeactivateResponse, ErrorResponse, UploadRequest, UploadResponse};
use super::{AppState, require_admin_secret};
use crate::error::ServerError;

fn invalid(e: ValidationError) -> ServerError {
    ServerError::Broker(BrokerError::Validation(e))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ServerError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| invalid(ValidationError::MissingField(field)))
}

/// Base of share links: the configured external URL, else the request's
/// forwarded scheme and `Host` header.
pub(crate) fn share_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = state.external_url.as_deref() {
        return url.trim_end_matches('/').to_owned();
    }
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let proto = header_str("x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .map_or("http", str::trim);
    let host = header_str(header::HOST.as_str()).unwrap_or("localhost");
    format!("{proto}://{host}")
}

/// `POST /v1/items` -- upload a file as a new shareable item.
#[utoipa::path(
    post,
    path = "/v1/items",
    tag = "Items",
    summary = "Upload a file",
    description = "Stores a base64-encoded file with an expiry and a view ceiling and returns its share link. Rate limited per origin.",
    request_body(content = UploadRequest, description = "File and access policy"),
    responses(
        (status = 200, description = "Item stored", body = UploadResponse),
        (status = 400, description = "Invalid upload", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse),
        (status = 429, description = "Too many uploads from this origin", body = ErrorResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse)
    )
)]
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let Json(req) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(format!(
                "request body exceeds {} bytes",
                state.max_body_bytes
            ))
        } else {
            ServerError::BadRequest(rejection.body_text())
        }
    })?;

    let file_name = required(req.file_name, "fileName")?;
    let encoded = required(req.file_base64, "fileBase64")?;
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|e| invalid(ValidationError::InvalidEncoding(e.to_string())))?;

    let receipt = state
        .broker
        .ingest(IngestRequest {
            file_name,
            data: Bytes::from(data),
            ttl_seconds: req.expiry_seconds,
            max_views: req.max_views,
        })
        .await?;

    let share_url = format!("{}{}", share_base(&state, &headers), receipt.share_path());
    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            ok: true,
            id: receipt.id.to_string(),
            share_url,
        }),
    ))
}

/// `DELETE /v1/items/{id}` -- deactivate an item ahead of its policy.
#[utoipa::path(
    delete,
    path = "/v1/items/{id}",
    tag = "Items",
    summary = "Deactivate an item",
    description = "Stops further views of an item. Its blob is reclaimed by the next sweep. Requires the `x-cleanup-secret` header.",
    params(("id" = String, Path, description = "Item identifier")),
    responses(
        (status = 200, description = "Item deactivated (or already inactive)", body = DeactivateResponse),
        (status = 400, description = "Malformed identifier", body = ErrorResponse),
        (status = 401, description = "Missing or wrong secret", body = ErrorResponse)
    )
)]
pub async fn deactivate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    require_admin_secret(&state, &headers)?;
    let id = ItemId::parse(&id).map_err(invalid)?;
    let deactivated = state.broker.deactivate(&id).await?;
    Ok((
        StatusCode::OK,
        Json(DeactivateResponse {
            ok: true,
            deactivated,
        }),
    ))
}
