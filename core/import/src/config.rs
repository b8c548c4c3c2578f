//! Service configuration.

use chrono::Duration;
use serde::Deserialize;
use std::path::Path;
use url::Url;

use driveimport_common::{Error, Result, Secret};
use driveimport_gdrive::{GoogleConfig, HttpConfig, IdentityConfig};

const ENV_GOOGLE_CLIENT_ID: &str = "DRIVEIMPORT_GOOGLE_CLIENT_ID";
const ENV_GOOGLE_CLIENT_SECRET: &str = "DRIVEIMPORT_GOOGLE_CLIENT_SECRET";
const ENV_IDENTITY_CLIENT_ID: &str = "DRIVEIMPORT_IDENTITY_CLIENT_ID";
const ENV_IDENTITY_CLIENT_SECRET: &str = "DRIVEIMPORT_IDENTITY_CLIENT_SECRET";

fn default_url_ttl_secs() -> u64 {
    900
}

/// Object storage settings for uploaded attachments.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base under which per-attachment upload URLs are issued.
    pub upload_base_url: Url,
    /// Validity of an issued upload URL.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

impl StorageConfig {
    /// Validity of an issued upload URL.
    pub fn url_ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.url_ttl_secs).unwrap_or(i64::MAX))
    }
}

/// Complete configuration of the import services.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub google: GoogleConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {}", e)))
    }

    /// Load a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Replace credentials with values from `lookup`, keyed by the
    /// `DRIVEIMPORT_*` variable names. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(id) = get(ENV_GOOGLE_CLIENT_ID) {
            self.google.client_id = id;
        }
        if let Some(secret) = get(ENV_GOOGLE_CLIENT_SECRET) {
            self.google.client_secret = Secret::new(secret);
        }
        if let Some(id) = get(ENV_IDENTITY_CLIENT_ID) {
            self.identity.client_id = id;
        }
        if let Some(secret) = get(ENV_IDENTITY_CLIENT_SECRET) {
            self.identity.client_secret = Secret::new(secret);
        }
    }

    /// Replace credentials from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Check that every credential is configured.
    pub fn validate(&self) -> Result<()> {
        self.google.validate()?;
        self.identity.validate()?;
        if self.storage.url_ttl_secs == 0 {
            return Err(Error::Configuration(
                "storage.url_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
