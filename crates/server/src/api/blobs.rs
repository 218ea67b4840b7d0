use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::AppState;
use super::schemas::BlobQuery;

/// `GET /v1/blobs/{*path}` -- serve a blob behind a signed link.
///
/// Every failure is a bare 404 so a link's validity cannot be probed.
#[utoipa::path(
    get,
    path = "/v1/blobs/{path}",
    tag = "Viewing",
    summary = "Fetch a file by signed link",
    params(
        ("path" = String, Path, description = "Blob path"),
        BlobQuery
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "Unknown, expired, or tampered link")
    )
)]
pub async fn get_blob(
    State(state): State<AppState>,
    Path(path): Path<String>,
    query: Result<Query<BlobQuery>, QueryRejection>,
) -> Response {
    let Ok(Query(query)) = query else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let (Some(signer), Some(expires), Some(sig)) = (state.signer.as_ref(), query.expires, query.sig)
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !signer.verify(&path, expires, &sig) {
        debug!(path = %path, "rejected blob link");
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.broker.blobs().get(&path).await {
        Ok(Some(blob)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, blob.content_type),
                (header::CACHE_CONTROL, "private, no-store".to_owned()),
            ],
            blob.data,
        )
            .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(path = %path, error = %e, "blob read failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
