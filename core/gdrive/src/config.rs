//! Endpoint and credential configuration for the upstream clients.
//!
//! Client identifiers and secrets have no built-in values; they must come
//! from the deployment's configuration or secret store.

use serde::Deserialize;
use std::time::Duration;
use url::Url;

use driveimport_common::{Error, Result, Secret};

/// Google OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Google token introspection endpoint.
const GOOGLE_TOKENINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/tokeninfo";
/// Google Drive API base URL.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Connection name of the Google identity in the identity-management API.
const GOOGLE_CONNECTION: &str = "google-oauth2";

fn parse_default(url: &str) -> Url {
    Url::parse(url).expect("built-in endpoint URL is valid")
}

fn default_token_url() -> Url {
    parse_default(GOOGLE_TOKEN_URL)
}

fn default_tokeninfo_url() -> Url {
    parse_default(GOOGLE_TOKENINFO_URL)
}

fn default_drive_api_base() -> Url {
    parse_default(DRIVE_API_BASE)
}

fn default_connection() -> String {
    GOOGLE_CONNECTION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    concat!("driveimport/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Google OAuth client and API endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    /// OAuth2 client ID registered with Google.
    #[serde(default)]
    pub client_id: String,
    /// OAuth2 client secret.
    #[serde(default)]
    pub client_secret: Secret,
    #[serde(default = "default_token_url")]
    pub token_url: Url,
    #[serde(default = "default_tokeninfo_url")]
    pub tokeninfo_url: Url,
    #[serde(default = "default_drive_api_base")]
    pub drive_api_base: Url,
}

impl GoogleConfig {
    /// Create a configuration pointing at Google's production endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: Secret) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            token_url: default_token_url(),
            tokeninfo_url: default_tokeninfo_url(),
            drive_api_base: default_drive_api_base(),
        }
    }

    /// Point every Google endpoint at `base` (used against mock servers).
    ///
    /// # Errors
    /// - `base` cannot be joined with the endpoint paths
    pub fn with_base_url(mut self, base: &Url) -> Result<Self> {
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| Error::InvalidInput(format!("Invalid base URL: {}", e)))
        };
        self.token_url = join("token")?;
        self.tokeninfo_url = join("oauth2/v3/tokeninfo")?;
        self.drive_api_base = join("drive/v3")?;
        Ok(self)
    }

    /// Check that credentials are present.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::Configuration(
                "Google client_id is not configured".to_string(),
            ));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Configuration(
                "Google client_secret is not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identity-management API (Auth0-style management API) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Tenant base URL, e.g. `https://tenant.eu.auth0.com/`.
    pub base_url: Url,
    /// Machine-to-machine client ID with `read:user_idp_tokens`.
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Secret,
    /// Management API audience. Defaults to `{base_url}/api/v2/`.
    #[serde(default)]
    pub audience: Option<String>,
    /// Provider name of the linked Google identity.
    #[serde(default = "default_connection")]
    pub connection: String,
    /// Reuse the management token until shortly before it expires.
    #[serde(default = "default_true")]
    pub cache_management_token: bool,
}

impl IdentityConfig {
    /// Create a configuration for the tenant at `base_url`.
    pub fn new(base_url: Url, client_id: impl Into<String>, client_secret: Secret) -> Self {
        Self {
            base_url,
            client_id: client_id.into(),
            client_secret,
            audience: None,
            connection: default_connection(),
            cache_management_token: true,
        }
    }

    /// Management API audience, derived from the tenant URL when unset.
    pub fn audience(&self) -> Result<String> {
        match &self.audience {
            Some(audience) => Ok(audience.clone()),
            None => self
                .base_url
                .join("api/v2/")
                .map(|u| u.to_string())
                .map_err(|e| Error::Configuration(format!("Invalid identity base URL: {}", e))),
        }
    }

    /// Check that credentials are present.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::Configuration(
                "Identity client_id is not configured".to_string(),
            ));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Configuration(
                "Identity client_secret is not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout. Unset means the client's default (none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: None,
        }
    }
}

impl HttpConfig {
    /// Build the client used for Drive, identity and storage requests.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))
    }

    /// Build the client used for OAuth2 grants.
    ///
    /// Redirects are not followed.
    pub fn build_oauth_client(&self) -> Result<oauth2::reqwest::Client> {
        let mut builder = oauth2::reqwest::ClientBuilder::new()
            .user_agent(&self.user_agent)
            .redirect(oauth2::reqwest::redirect::Policy::none());
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create OAuth client: {}", e)))
    }
}
