//! Google OAuth2 refresh and token introspection.

use oauth2::basic::{BasicClient, BasicErrorResponseType};
use oauth2::{
    AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken,
    RequestTokenError, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};
use url::Url;

use driveimport_common::{Error, Result, Secret};

use crate::config::{GoogleConfig, HttpConfig};

/// Scope required to read the user's Drive files.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// OAuth2 client with only the token endpoint configured.
pub(crate) type TokenEndpointClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Build an OAuth2 client that sends its credentials in the request body.
pub(crate) fn token_endpoint_client(
    client_id: &str,
    client_secret: &Secret,
    token_url: &Url,
) -> Result<TokenEndpointClient> {
    let token_url = TokenUrl::new(token_url.to_string())
        .map_err(|e| Error::Configuration(format!("Invalid token URL: {}", e)))?;

    Ok(BasicClient::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.expose().to_string()))
        .set_auth_type(AuthType::RequestBody)
        .set_token_uri(token_url))
}

/// Token metadata returned by Google's tokeninfo endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: String,
    /// Seconds until expiry (Google sends this as a string).
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub azp: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl TokenInfo {
    /// Iterate over the granted scopes.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    /// Check whether `scope` was granted.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|s| s == scope)
    }

    /// Check whether the token grants read access to Drive files.
    pub fn grants_drive_read(&self) -> bool {
        self.has_scope(DRIVE_READONLY_SCOPE)
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::String(s)) => s.parse().ok(),
        None => None,
    })
}

/// Google OAuth2 operations needed by the token lifecycle.
pub struct GoogleAuth {
    http: reqwest::Client,
    oauth_http: oauth2::reqwest::Client,
    client: TokenEndpointClient,
    config: GoogleConfig,
}

impl GoogleAuth {
    /// Create a new Google auth helper.
    ///
    /// # Errors
    /// - Missing client credentials
    /// - Invalid token URL
    pub fn new(config: GoogleConfig, http: &HttpConfig) -> Result<Self> {
        config.validate()?;
        let client =
            token_endpoint_client(&config.client_id, &config.client_secret, &config.token_url)?;

        Ok(Self {
            http: http.build_client()?,
            oauth_http: http.build_oauth_client()?,
            client,
            config,
        })
    }

    /// Query the token's validity and scope.
    ///
    /// Any failure (transport error, non-success status, malformed body)
    /// yields `None`, meaning the token must be treated as invalid.
    pub async fn introspect(&self, access_token: &Secret) -> Option<TokenInfo> {
        match self.fetch_token_info(access_token).await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Token introspection returned no info: {}", e);
                None
            }
        }
    }

    async fn fetch_token_info(&self, access_token: &Secret) -> Result<TokenInfo> {
        let response = self
            .http
            .get(self.config.tokeninfo_url.clone())
            .query(&[("access_token", access_token.expose())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to reach tokeninfo: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "tokeninfo rejected token: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Malformed tokeninfo response: {}", e)))
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    /// - `ReauthorizationRequired` if Google rejects the grant (revoked or expired)
    /// - `Authentication` if Google rejects the client credentials
    /// - `Network` on transport failure
    pub async fn refresh_access_token(&self, refresh_token: &Secret) -> Result<Secret> {
        info!("Refreshing Google access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.expose().to_string()))
            .request_async(&self.oauth_http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => match response.error() {
                    BasicErrorResponseType::InvalidClient
                    | BasicErrorResponseType::UnauthorizedClient => Error::Authentication(
                        format!("Google rejected client credentials: {}", response),
                    ),
                    _ => Error::ReauthorizationRequired(format!(
                        "Token refresh rejected: {}",
                        response
                    )),
                },
                RequestTokenError::Request(e) => {
                    Error::Network(format!("Token refresh failed: {}", e))
                }
                RequestTokenError::Parse(e, _) => {
                    Error::Serialization(format!("Malformed token response: {}", e))
                }
                RequestTokenError::Other(msg) => {
                    Error::Network(format!("Token refresh failed: {}", msg))
                }
            })?;

        Ok(Secret::new(token_result.access_token().secret().clone()))
    }
}
