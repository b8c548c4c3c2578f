//! Contracts of the application services the import flow relies on.
//!
//! All operations are async. Implementations map their own failures onto
//! the common error type (`NotFound`, `Validation`, `Storage`).

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

use driveimport_common::{Result, Secret, UserId};

use crate::models::{Attachment, ContentPost, NewAttachment, NewPost, UserAccount};

/// Access to internal user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user.
    ///
    /// # Errors
    /// - `NotFound` if no such user exists
    async fn get_user(&self, id: &UserId) -> Result<UserAccount>;

    /// Overwrite the user's stored Google refresh token.
    async fn set_provider_refresh_token(&self, id: &UserId, token: Secret) -> Result<()>;
}

/// Schema validation for caller-supplied entity fields.
#[async_trait]
pub trait SchemaValidator: Send + Sync {
    /// Check `fields` against the schema of `entity`.
    ///
    /// # Errors
    /// - `Validation` if any field violates the schema
    async fn verify_schema(&self, entity: &str, fields: &Map<String, Value>) -> Result<()>;
}

/// Post persistence.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Persist a post, assigning its id.
    async fn create(&self, post: NewPost) -> Result<ContentPost>;

    /// Remove a post.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Attachment persistence.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Persist an attachment record, assigning its id.
    async fn create(&self, attachment: NewAttachment) -> Result<Attachment>;

    /// Remove an attachment record.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Issues time-limited write URLs into object storage.
#[async_trait]
pub trait UploadUrlIssuer: Send + Sync {
    /// Signed, single-use upload URL for the attachment's storage slot.
    async fn upload_url_for_attachment(&self, attachment_id: &str) -> Result<Url>;
}

/// The set of collaborators the services are wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub schema: Arc<dyn SchemaValidator>,
    pub posts: Arc<dyn PostRepository>,
    pub attachments: Arc<dyn AttachmentRepository>,
    pub upload_urls: Arc<dyn UploadUrlIssuer>,
}
