use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use ephemera_broker::BrokerMetrics;

use super::limiter::{RateLimitResult, RateLimiter};
use crate::error::ServerError;

/// Origin used when neither a forwarded address nor a peer address is known.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Identify the caller: first `X-Forwarded-For` entry (when trusted), else
/// the peer address, else [`UNKNOWN_ORIGIN`].
pub fn client_origin(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded
        && let Some(first) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    {
        return first.to_owned();
    }
    peer.map_or_else(|| UNKNOWN_ORIGIN.to_owned(), |addr| addr.ip().to_string())
}

/// Tower layer that rate limits requests per origin.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Option<Arc<RateLimiter>>,
    metrics: Arc<BrokerMetrics>,
    trust_forwarded: bool,
}

impl RateLimitLayer {
    pub fn new(
        limiter: Option<Arc<RateLimiter>>,
        metrics: Arc<BrokerMetrics>,
        trust_forwarded: bool,
    ) -> Self {
        Self {
            limiter,
            metrics,
            trust_forwarded,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
            metrics: Arc::clone(&self.metrics),
            trust_forwarded: self.trust_forwarded,
        }
    }
}

/// Tower service that enforces the per-origin limit.
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Option<Arc<RateLimiter>>,
    metrics: Arc<BrokerMetrics>,
    trust_forwarded: bool,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let Some(limiter) = self.limiter.clone() else {
            let fut = self.inner.call(req);
            return Box::pin(fut);
        };

        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let origin = client_origin(req.headers(), peer, self.trust_forwarded);

        match limiter.check(&origin) {
            Ok(result) => {
                let fut = self.inner.call(req);
                Box::pin(async move {
                    let response = fut.await?;
                    Ok(add_rate_limit_headers(response, &result))
                })
            }
            Err(exceeded) => {
                self.metrics.increment_rate_limited();
                tracing::info!(origin = %origin, "upload rate limited");
                let response = ServerError::RateLimited {
                    retry_after: exceeded.retry_after,
                }
                .into_response();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

fn add_rate_limit_headers(response: Response, result: &RateLimitResult) -> Response {
    let (mut parts, body) = response.into_parts();
    parts.headers.insert("X-RateLimit-Limit", result.limit.into());
    parts
        .headers
        .insert("X-RateLimit-Remaining", result.remaining.into());
    parts
        .headers
        .insert("X-RateLimit-Reset", result.reset_after.into());
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(xff: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_str(xff).unwrap());
        h
    }

    #[test]
    fn forwarded_for_first_entry_wins() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let origin = client_origin(&headers(" 203.0.113.7 , 10.0.0.1"), Some(peer), true);
        assert_eq!(origin, "203.0.113.7");
    }

    #[test]
    fn untrusted_forwarded_for_is_ignored() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let origin = client_origin(&headers("203.0.113.7"), Some(peer), false);
        assert_eq!(origin, "192.168.1.9");
    }

    #[test]
    fn empty_forwarded_for_falls_back_to_peer() {
        let peer: SocketAddr = "[::1]:5000".parse().unwrap();
        assert_eq!(client_origin(&headers(""), Some(peer), true), "::1");
    }

    #[test]
    fn no_information_is_unknown() {
        assert_eq!(client_origin(&HeaderMap::new(), None, true), UNKNOWN_ORIGIN);
    }
}
