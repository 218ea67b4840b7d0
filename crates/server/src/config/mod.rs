mod blob;
mod logging;
mod policy;
mod server;
mod store;


pub use blob::*;
pub use logging::*;
pub use policy::*;
pub use server::*;
pub use store::*;

pub use crate::ratelimit::RateLimitConfig;

use std::path::Path;

use serde::Deserialize;

use crate::error::ServerError;

/// Environment variable holding the hex-encoded URL signing secret.
pub const SIGNING_KEY_ENV: &str = "EPHEMERA_SIGNING_KEY";

/// Environment variable holding the sweep/admin shared secret.
pub const SWEEP_SECRET_ENV: &str = "EPHEMERA_SWEEP_SECRET";

/// Top-level configuration for the Ephemera server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct EphemeraConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Blob store backend and URL signing.
    #[serde(default)]
    pub blob: BlobConfig,
    /// Upload bounds.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Signed link lifetimes and deferred deletion.
    #[serde(default)]
    pub access: AccessConfig,
    /// Reclamation sweeper.
    #[serde(default)]
    pub sweeper: SweeperConfig,
    /// Per-origin upload rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EphemeraConfig {
    /// Parse a configuration document.
    pub fn from_toml(contents: &str) -> Result<Self, ServerError> {
        toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load the configuration at `path`, or all defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Fill secrets left out of the file from the environment.
    pub fn apply_env(&mut self) {
        if self.blob.signing_secret.is_none() {
            self.blob.signing_secret = std::env::var(SIGNING_KEY_ENV).ok().filter(|s| !s.is_empty());
        }
        if self.sweeper.secret.is_none() {
            self.sweeper.secret = std::env::var(SWEEP_SECRET_ENV).ok().filter(|s| !s.is_empty());
        }
    }

    /// Base URL used for share links and self-hosted signed blob links.
    pub fn public_base_url(&self) -> String {
        self.server.external_url.as_ref().map_or_else(
            || format!("http://{}:{}", self.server.host, self.server.port),
            |url| url.trim_end_matches('/').to_owned(),
        )
    }
}
