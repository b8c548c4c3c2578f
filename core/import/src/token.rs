//! Google access-token lifecycle for a user.

use std::sync::Arc;
use tracing::{debug, info};

use driveimport_common::{Error, Result, Secret, SubjectId, UserId};
use driveimport_gdrive::{GoogleAuth, IdentityClient, TokenInfo};

use crate::collaborators::UserDirectory;

/// Produces a Google access token able to read the user's Drive files.
pub struct TokenService {
    identity: Arc<IdentityClient>,
    google: Arc<GoogleAuth>,
    users: Arc<dyn UserDirectory>,
}

impl TokenService {
    /// Create a new token service.
    pub fn new(
        identity: Arc<IdentityClient>,
        google: Arc<GoogleAuth>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            identity,
            google,
            users,
        }
    }

    /// Get an access token for `user_id`, refreshing it when needed.
    ///
    /// The token from the user's linked identity is returned unchanged when
    /// it is valid and grants drive read access. Otherwise it is replaced
    /// through the refresh-token grant, even if it has not expired: a later
    /// login may have narrowed its scope.
    ///
    /// # Errors
    /// - `IdentityNotLinked` if the subject has no Google identity
    /// - `ReauthorizationRequired` if no usable refresh token remains
    /// - `Network` / `Authentication` from the upstream APIs
    pub async fn access_token(&self, user_id: &UserId, subject: &SubjectId) -> Result<Secret> {
        let linked = self.identity.linked_identity(subject).await?;

        let refresh_token = match linked.refresh_token {
            Some(token) => {
                info!(user = %user_id, "Storing rotated Google refresh token");
                self.users
                    .set_provider_refresh_token(user_id, token.clone())
                    .await?;
                Some(token)
            }
            None => self.users.get_user(user_id).await?.provider_refresh_token,
        };

        if let Some(access_token) = linked.access_token {
            match self.google.introspect(&access_token).await {
                Some(info) if info.grants_drive_read() => {
                    debug!(user = %user_id, "Current Google token is valid");
                    return Ok(access_token);
                }
                Some(_) => info!(user = %user_id, "Google token lacks drive read scope"),
                None => info!(user = %user_id, "Google token is invalid or expired"),
            }
        } else {
            info!(user = %user_id, "Linked identity carries no access token");
        }

        let refresh_token = refresh_token.ok_or_else(|| {
            Error::ReauthorizationRequired(format!(
                "No Google refresh token stored for user {}",
                user_id
            ))
        })?;

        self.google.refresh_access_token(&refresh_token).await
    }

    /// Query the token's validity and scope. `None` means invalid.
    pub async fn introspect(&self, access_token: &Secret) -> Option<TokenInfo> {
        self.google.introspect(access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryUserDirectory;
    use crate::models::UserAccount;
    use driveimport_gdrive::{GoogleConfig, HttpConfig, IdentityConfig, DRIVE_READONLY_SCOPE};
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        server: MockServer,
        users: Arc<MemoryUserDirectory>,
        service: TokenService,
    }

    async fn harness(stored_refresh: Option<&str>) -> Harness {
        let server = MockServer::start().await;
        let base = Url::parse(&server.uri()).unwrap();
        let http = HttpConfig::default();

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "mgmt",
                "token_type": "Bearer",
                "expires_in": 86400
            })))
            .mount(&server)
            .await;

        let identity = IdentityClient::new(
            IdentityConfig::new(base.clone(), "m2m", Secret::new("m2m-secret")),
            &http,
        )
        .unwrap();
        let google = GoogleAuth::new(
            GoogleConfig::new("google-id", Secret::new("google-secret"))
                .with_base_url(&base)
                .unwrap(),
            &http,
        )
        .unwrap();

        let users = Arc::new(MemoryUserDirectory::new());
        let mut user = UserAccount::new(user_id());
        if let Some(token) = stored_refresh {
            user = user.with_refresh_token(Secret::new(token));
        }
        users.insert(user).await;

        let service = TokenService::new(Arc::new(identity), Arc::new(google), users.clone());
        Harness {
            server,
            users,
            service,
        }
    }

    fn user_id() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn subject() -> SubjectId {
        SubjectId::new("google-oauth2|1234").unwrap()
    }

    async fn mount_identity(server: &MockServer, identity: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/v2/users/.+$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "identities": [identity] })),
            )
            .mount(server)
            .await;
    }

    async fn mount_tokeninfo(server: &MockServer, token: &str, scope: &str) {
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/tokeninfo"))
            .and(query_param("access_token", token))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "scope": scope,
                "expires_in": "1800"
            })))
            .mount(server)
            .await;
    }

    async fn mount_refresh(server: &MockServer, refresh_token: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={}", refresh_token)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.refreshed",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_valid_scoped_token_is_returned_without_refresh() {
        let h = harness(Some("stored")).await;
        mount_identity(
            &h.server,
            serde_json::json!({"provider": "google-oauth2", "access_token": "ya29.current"}),
        )
        .await;
        mount_tokeninfo(
            &h.server,
            "ya29.current",
            &format!("openid {}", DRIVE_READONLY_SCOPE),
        )
        .await;
        mount_refresh(&h.server, "stored", 0).await;

        let token = h.service.access_token(&user_id(), &subject()).await.unwrap();
        assert_eq!(token.expose(), "ya29.current");
    }

    #[tokio::test]
    async fn test_narrowed_scope_triggers_refresh() {
        let h = harness(Some("stored")).await;
        mount_identity(
            &h.server,
            serde_json::json!({"provider": "google-oauth2", "access_token": "ya29.narrow"}),
        )
        .await;
        mount_tokeninfo(&h.server, "ya29.narrow", "openid email").await;
        mount_refresh(&h.server, "stored", 1).await;

        let token = h.service.access_token(&user_id(), &subject()).await.unwrap();
        assert_eq!(token.expose(), "ya29.refreshed");
    }

    #[tokio::test]
    async fn test_invalid_token_triggers_refresh() {
        let h = harness(Some("stored")).await;
        mount_identity(
            &h.server,
            serde_json::json!({"provider": "google-oauth2", "access_token": "ya29.expired"}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/v3/tokeninfo"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&h.server)
            .await;
        mount_refresh(&h.server, "stored", 1).await;

        let token = h.service.access_token(&user_id(), &subject()).await.unwrap();
        assert_eq!(token.expose(), "ya29.refreshed");
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted_and_used() {
        let h = harness(Some("old")).await;
        mount_identity(
            &h.server,
            serde_json::json!({
                "provider": "google-oauth2",
                "access_token": "ya29.narrow",
                "refresh_token": "rotated"
            }),
        )
        .await;
        mount_tokeninfo(&h.server, "ya29.narrow", "openid").await;
        mount_refresh(&h.server, "rotated", 1).await;

        h.service.access_token(&user_id(), &subject()).await.unwrap();

        let user = h.users.get_user(&user_id()).await.unwrap();
        assert_eq!(user.provider_refresh_token.unwrap().expose(), "rotated");
    }

    #[tokio::test]
    async fn test_refresh_needed_without_stored_token() {
        let h = harness(None).await;
        mount_identity(
            &h.server,
            serde_json::json!({"provider": "google-oauth2", "access_token": "ya29.narrow"}),
        )
        .await;
        mount_tokeninfo(&h.server, "ya29.narrow", "openid").await;

        let err = h
            .service
            .access_token(&user_id(), &subject())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReauthorizationRequired(_)));
    }

    #[tokio::test]
    async fn test_identity_not_linked() {
        let h = harness(Some("stored")).await;
        mount_identity(&h.server, serde_json::json!({"provider": "github"})).await;

        let err = h
            .service
            .access_token(&user_id(), &subject())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdentityNotLinked(_)));
    }

    #[tokio::test]
    async fn test_unknown_user_is_precondition_failure() {
        let h = harness(None).await;
        mount_identity(
            &h.server,
            serde_json::json!({"provider": "google-oauth2", "access_token": "t"}),
        )
        .await;

        let err = h
            .service
            .access_token(&UserId::new("ghost").unwrap(), &subject())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
