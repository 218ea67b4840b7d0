use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use ephemera_broker::BrokerError;
use ephemera_core::{ConsumeStatus, ItemId};

use super::AppState;
use super::schemas::{ConsumeFailure, ConsumeRequest, ConsumeResponse};

const REASON_ERROR: &str = "error";

fn failure(status: StatusCode, reason: &str, message: Option<&str>) -> Response {
    let body = ConsumeFailure {
        ok: false,
        reason: reason.to_owned(),
        message: message.map(str::to_owned),
    };
    (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
}

fn not_found() -> Response {
    failure(StatusCode::NOT_FOUND, ConsumeStatus::NotFound.as_str(), None)
}

/// `POST /v1/consume` -- spend one view and receive a short-lived file link.
///
/// Outcomes form a closed set: ok, `not_found`, expired, or error. An item
/// past its expiry or view ceiling is reported as expired whether or not it
/// was ever viewed.
#[utoipa::path(
    post,
    path = "/v1/consume",
    tag = "Viewing",
    summary = "Consume one view",
    description = "Atomically spends one view of an item. On success returns a signed link valid for at most five minutes and never beyond the item's own expiry.",
    request_body(content = ConsumeRequest, description = "Item to view"),
    responses(
        (status = 200, description = "View granted", body = ConsumeResponse),
        (status = 400, description = "Missing id", body = ConsumeFailure),
        (status = 404, description = "No such item", body = ConsumeFailure),
        (status = 410, description = "Item expired or out of views", body = ConsumeFailure),
        (status = 500, description = "View spent but link could not be issued", body = ConsumeFailure),
        (status = 503, description = "Storage unavailable", body = ConsumeFailure)
    )
)]
pub async fn consume(
    State(state): State<AppState>,
    payload: Result<Json<ConsumeRequest>, JsonRejection>,
) -> Response {
    let id = match payload {
        Ok(Json(ConsumeRequest { id: Some(id) })) if !id.trim().is_empty() => id,
        _ => return failure(StatusCode::BAD_REQUEST, REASON_ERROR, Some("missing id")),
    };

    // A malformed identifier can never name an item.
    let Ok(id) = ItemId::parse(&id) else {
        return not_found();
    };

    match state.broker.consume(&id).await {
        Ok(grant) => {
            let body = ConsumeResponse {
                ok: true,
                file_url: grant.url,
                remaining_views: grant.remaining_views,
                expiry_at: grant.expiry_at,
                seconds_left: grant.seconds_left,
            };
            (StatusCode::OK, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
        }
        Err(BrokerError::NotFound) => not_found(),
        Err(BrokerError::Expired) => {
            failure(StatusCode::GONE, ConsumeStatus::Expired.as_str(), None)
        }
        Err(BrokerError::Access(_)) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            REASON_ERROR,
            Some("could not issue a link for this file"),
        ),
        Err(e) if e.is_transient() => {
            warn!(item_id = %id, error = %e, "consume failed on storage");
            failure(
                StatusCode::SERVICE_UNAVAILABLE,
                REASON_ERROR,
                Some("storage temporarily unavailable"),
            )
        }
        Err(e) => {
            warn!(item_id = %id, error = %e, "consume failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, REASON_ERROR, None)
        }
    }
}
