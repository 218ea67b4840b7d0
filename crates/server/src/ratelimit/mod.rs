pub mod config;
pub mod limiter;
pub mod middleware;

pub use config::RateLimitConfig;
pub use limiter::RateLimiter;
pub use middleware::RateLimitLayer;
