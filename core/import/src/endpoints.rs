//! Request handlers for Drive access checks, listing and import.
//!
//! Routing and authentication belong to the host server. Handlers receive
//! the already authenticated [`AuthContext`] and return a [`Response`] with
//! the status to send; failures map to statuses through [`status_for_error`].

use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, info};

use driveimport_common::{Error, Result, SubjectId, UserId};
use driveimport_gdrive::{DriveClient, FileList, GoogleAuth, IdentityClient};

use crate::collaborators::{Collaborators, UserDirectory};
use crate::config::AppConfig;
use crate::importer::FileImportService;
use crate::listing::FileListingService;
use crate::models::{ContentPost, ImportRequest};
use crate::token::TokenService;
use crate::upload::BlobUploader;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Internal user id.
    pub user_id: UserId,
    /// Identity-provider subject of the session.
    pub subject: SubjectId,
}

impl AuthContext {
    pub fn new(user_id: UserId, subject: SubjectId) -> Self {
        Self { user_id, subject }
    }
}

/// A successful handler result.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub status: StatusCode,
    pub body: T,
}

impl<T> Response<T> {
    fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }
}

/// HTTP status reported for an error.
pub fn status_for_error(error: &Error) -> StatusCode {
    match error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::IdentityNotLinked(_) | Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
        Error::ReauthorizationRequired(_) => StatusCode::UNAUTHORIZED,
        Error::Validation(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        Error::Authentication(_) | Error::Network(_) | Error::Serialization(_) => {
            StatusCode::BAD_GATEWAY
        }
        Error::Storage(_) | Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The Drive import endpoints, wired to their services.
pub struct DriveEndpoints {
    users: Arc<dyn UserDirectory>,
    tokens: Arc<TokenService>,
    listing: FileListingService,
    import: FileImportService,
}

impl DriveEndpoints {
    /// Build the upstream clients and services from `config`.
    ///
    /// # Errors
    /// - `Configuration` if credentials are missing or an HTTP client cannot be built
    pub fn new(config: &AppConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let identity = Arc::new(IdentityClient::new(config.identity.clone(), &config.http)?);
        let google = Arc::new(GoogleAuth::new(config.google.clone(), &config.http)?);
        let drive = Arc::new(DriveClient::new(&config.google, &config.http)?);
        let uploader = BlobUploader::new(&config.http)?;

        let tokens = Arc::new(TokenService::new(
            identity,
            google,
            collaborators.users.clone(),
        ));

        Ok(Self {
            users: collaborators.users.clone(),
            listing: FileListingService::new(tokens.clone(), drive.clone()),
            import: FileImportService::new(tokens.clone(), drive, uploader, collaborators),
            tokens,
        })
    }

    /// Check whether the caller can read their Drive files.
    ///
    /// Answers `204 No Content` when the current token carries the drive
    /// read scope, or when a refresh token was already stored for the user:
    /// a later login may have replaced the scoped token with a narrower one
    /// while the earlier grant is still usable. Otherwise `403 Forbidden`.
    ///
    /// A user without any usable grant gets `403` rather than the `401` the
    /// token flow reports elsewhere.
    pub async fn verify_access(&self, ctx: &AuthContext) -> Result<Response<()>> {
        let user = self.users.get_user(&ctx.user_id).await?;

        let token = match self.tokens.access_token(&ctx.user_id, &ctx.subject).await {
            Ok(token) => token,
            Err(Error::ReauthorizationRequired(reason)) => {
                debug!(user = %ctx.user_id, "No usable Drive grant: {}", reason);
                return Ok(Response {
                    status: StatusCode::FORBIDDEN,
                    body: (),
                });
            }
            Err(e) => return Err(e),
        };
        let scoped = self
            .tokens
            .introspect(&token)
            .await
            .is_some_and(|info| info.grants_drive_read());

        let status = if scoped || user.provider_refresh_token.is_some() {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::FORBIDDEN
        };
        debug!(user = %ctx.user_id, scoped, %status, "Verified Drive access");

        Ok(Response { status, body: () })
    }

    /// List one page of the caller's importable files.
    pub async fn list_files(
        &self,
        ctx: &AuthContext,
        page_token: Option<&str>,
    ) -> Result<Response<FileList>> {
        self.users.get_user(&ctx.user_id).await?;

        let list = self
            .listing
            .list_files(&ctx.user_id, &ctx.subject, page_token)
            .await?;
        Ok(Response::ok(list))
    }

    /// Import the requested files, returning the created posts in order.
    pub async fn import_files(
        &self,
        ctx: &AuthContext,
        request: ImportRequest,
    ) -> Result<Response<Vec<ContentPost>>> {
        self.users.get_user(&ctx.user_id).await?;

        info!(user = %ctx.user_id, files = request.files.len(), "Import requested");
        let posts = self
            .import
            .import_files(
                &ctx.user_id,
                &ctx.subject,
                &request.files,
                request.set_fields.as_ref(),
            )
            .await?;
        Ok(Response::ok(posts))
    }
}
