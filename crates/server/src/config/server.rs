use serde::Deserialize;

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Graceful shutdown timeout in seconds.
    ///
    /// Upper bound on waiting for deferred deletions still in flight. Anything
    /// unfinished is left to the reclamation sweeper.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
    /// Public URL of this service (e.g. `https://share.example.com`).
    ///
    /// Used for share links and for signed links into the local and memory
    /// blob backends. If not set, share links are derived from the request's
    /// `Host` header and blob links from `http://{host}:{port}`.
    pub external_url: Option<String>,
    /// HTTP request body ceiling in megabytes.
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            external_url: None,
            max_body_mb: default_max_body_mb(),
        }
    }
}

impl ServerConfig {
    /// Body limit in bytes.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_mb() -> usize {
    12
}
