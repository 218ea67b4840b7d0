pub mod blobs;
pub mod consume;
pub mod health;
pub mod items;
pub mod openapi;
pub mod schemas;
pub mod sweep;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use ephemera_blob::UrlSigner;
use ephemera_broker::Broker;

use crate::error::ServerError;
use crate::ratelimit::{RateLimitLayer, RateLimiter};

use self::openapi::ApiDoc;

/// Header carrying the shared secret for sweep and deactivation.
pub const ADMIN_SECRET_HEADER: &str = "x-cleanup-secret";

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The broker instance.
    pub broker: Arc<Broker>,
    /// Optional upload rate limiter (None when rate limiting is disabled).
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Whether `X-Forwarded-For` identifies the client for rate limiting.
    pub trust_forwarded_for: bool,
    /// Verifier for links served by `GET /v1/blobs/...` (None for S3).
    pub signer: Option<UrlSigner>,
    /// Shared secret for sweep and deactivation (None rejects every call).
    pub admin_secret: Option<String>,
    /// Public base URL for share links. Derived from request headers when unset.
    pub external_url: Option<String>,
    /// HTTP request body ceiling in bytes.
    pub max_body_bytes: usize,
}

/// Build the Axum router with all API routes, middleware, and Swagger UI.
pub fn router(state: AppState) -> Router {
    let uploads = Router::new()
        .route("/v1/items", post(items::upload))
        .route_layer(RateLimitLayer::new(
            state.rate_limiter.clone(),
            Arc::clone(state.broker.metrics()),
            state.trust_forwarded_for,
        ));

    let api = Router::new()
        // Health & metrics
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        // Viewing
        .route("/v1/consume", post(consume::consume))
        .route("/v1/blobs/{*path}", get(blobs::get_blob))
        // Administration (shared secret)
        .route("/v1/items/{id}", delete(items::deactivate))
        .route("/v1/sweep", post(sweep::sweep));

    let body_limit = state.max_body_bytes;

    Router::new()
        .merge(uploads)
        .merge(api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Check the `x-cleanup-secret` header against the configured secret.
pub(crate) fn require_admin_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ServerError> {
    let Some(expected) = state.admin_secret.as_deref() else {
        return Err(ServerError::Unauthorized("no admin secret configured".into()));
    };
    let presented = headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ServerError::Unauthorized("invalid cleanup secret".into()))
    }
}
