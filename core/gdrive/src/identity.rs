//! Identity-management API client.
//!
//! The identity-management service keeps the Google tokens issued when the
//! user logged in with Google. Reading them requires a management token,
//! obtained with a client credentials grant.

use chrono::{DateTime, Duration, Utc};
use oauth2::{RequestTokenError, TokenResponse};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use driveimport_common::{Error, Result, Secret, SubjectId};

use crate::auth::{token_endpoint_client, TokenEndpointClient};
use crate::config::{HttpConfig, IdentityConfig};

/// Characters left unescaped in a subject id path segment.
const SUBJECT_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// One entry of the user's `identities` array.
#[derive(Debug, Clone, Deserialize)]
struct IdentityRecord {
    provider: String,
    #[serde(default)]
    access_token: Option<Secret>,
    #[serde(default)]
    refresh_token: Option<Secret>,
}

/// User profile returned by the management API (only the fields we read).
#[derive(Debug, Deserialize)]
struct UserProfile {
    #[serde(default)]
    identities: Vec<IdentityRecord>,
}

/// Google credentials attached to the user's linked identity.
#[derive(Debug, Clone)]
pub struct LinkedIdentity {
    /// Access token from the user's latest Google login, if any.
    pub access_token: Option<Secret>,
    /// Refresh token, present only when Google issued a new one.
    pub refresh_token: Option<Secret>,
}

/// Management token with expiration tracking.
#[derive(Debug, Clone)]
struct ManagementToken {
    token: Secret,
    expires_at: DateTime<Utc>,
}

impl ManagementToken {
    /// Check if the token is expired or about to expire.
    fn is_expired(&self) -> bool {
        // Consider expired if less than 5 minutes remaining
        self.expires_at < Utc::now() + Duration::minutes(5)
    }
}

/// Client for the identity-management API.
pub struct IdentityClient {
    http: reqwest::Client,
    oauth_http: oauth2::reqwest::Client,
    client: TokenEndpointClient,
    audience: String,
    config: IdentityConfig,
    cached: RwLock<Option<ManagementToken>>,
}

impl IdentityClient {
    /// Create a new identity-management client.
    ///
    /// # Errors
    /// - Missing client credentials
    /// - Invalid tenant URL
    pub fn new(config: IdentityConfig, http: &HttpConfig) -> Result<Self> {
        config.validate()?;
        let token_url = config
            .base_url
            .join("oauth/token")
            .map_err(|e| Error::Configuration(format!("Invalid identity base URL: {}", e)))?;
        let client = token_endpoint_client(&config.client_id, &config.client_secret, &token_url)?;
        let audience = config.audience()?;

        Ok(Self {
            http: http.build_client()?,
            oauth_http: http.build_oauth_client()?,
            client,
            audience,
            config,
            cached: RwLock::new(None),
        })
    }

    /// Get a management token, reusing the cached one while it is valid.
    pub async fn management_token(&self) -> Result<Secret> {
        if !self.config.cache_management_token {
            return Ok(self.request_management_token().await?.token);
        }

        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        let token = self.request_management_token().await?;
        let secret = token.token.clone();
        *cached = Some(token);
        Ok(secret)
    }

    /// Drop the cached management token.
    pub async fn invalidate_management_token(&self) {
        *self.cached.write().await = None;
    }

    async fn request_management_token(&self) -> Result<ManagementToken> {
        debug!("Requesting identity-management token");

        let token_result = self
            .client
            .exchange_client_credentials()
            .add_extra_param("audience", self.audience.clone())
            .request_async(&self.oauth_http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => Error::Authentication(format!(
                    "Management token request rejected: {}",
                    response
                )),
                RequestTokenError::Request(e) => {
                    Error::Network(format!("Management token request failed: {}", e))
                }
                RequestTokenError::Parse(e, _) => {
                    Error::Serialization(format!("Malformed management token response: {}", e))
                }
                RequestTokenError::Other(msg) => {
                    Error::Network(format!("Management token request failed: {}", msg))
                }
            })?;

        let expires_in = token_result
            .expires_in()
            .unwrap_or_else(|| std::time::Duration::from_secs(3600));
        let expires_at =
            Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

        Ok(ManagementToken {
            token: Secret::new(token_result.access_token().secret().clone()),
            expires_at,
        })
    }

    /// Fetch the Google credentials linked to `subject`.
    ///
    /// # Errors
    /// - `NotFound` if the subject is unknown
    /// - `IdentityNotLinked` if the subject has no Google identity
    /// - `Authentication` if the management token is refused
    /// - `Network` on transport failure
    pub async fn linked_identity(&self, subject: &SubjectId) -> Result<LinkedIdentity> {
        let token = self.management_token().await?;
        let url = self.user_url(subject)?;

        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.expose()))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch user profile: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Identity subject {}", subject)));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate_management_token().await;
            return Err(Error::Authentication(format!(
                "Management API refused profile access: {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!(
                "Management API error: {} - {}",
                status, body
            )));
        }

        let profile: UserProfile = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Malformed user profile: {}", e)))?;

        let identity = profile
            .identities
            .into_iter()
            .find(|i| i.provider == self.config.connection)
            .ok_or_else(|| {
                Error::IdentityNotLinked(format!(
                    "{} has no {} identity",
                    subject, self.config.connection
                ))
            })?;

        if identity.refresh_token.is_some() {
            info!(subject = %subject, "Identity carries a rotated refresh token");
        }

        Ok(LinkedIdentity {
            access_token: identity.access_token,
            refresh_token: identity.refresh_token,
        })
    }

    fn user_url(&self, subject: &SubjectId) -> Result<Url> {
        let encoded = utf8_percent_encode(subject.as_str(), SUBJECT_SEGMENT).to_string();
        self.config
            .base_url
            .join(&format!("api/v2/users/{}", encoded))
            .map_err(|e| Error::InvalidInput(format!("Invalid subject id: {}", e)))
    }
}
