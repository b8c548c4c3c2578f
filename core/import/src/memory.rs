//! In-memory collaborators.
//!
//! Useful for testing and development. All records are stored in memory
//! and lost on drop.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use driveimport_common::{Error, Result, Secret, UserId};

use crate::collaborators::{
    AttachmentRepository, Collaborators, PostRepository, SchemaValidator, UploadUrlIssuer,
    UserDirectory,
};
use crate::models::{Attachment, ContentPost, NewAttachment, NewPost, UserAccount};

/// In-memory user directory.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserAccount>>,
}

impl MemoryUserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    pub async fn insert(&self, user: UserAccount) {
        self.users.write().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_user(&self, id: &UserId) -> Result<UserAccount> {
        self.users
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))
    }

    async fn set_provider_refresh_token(&self, id: &UserId, token: Secret) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))?;
        user.provider_refresh_token = Some(token);
        Ok(())
    }
}

/// Accepted JSON shape of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// RFC 3339 timestamp string.
    Timestamp,
    StringList,
    Object,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Timestamp => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Object => value.is_object(),
        }
    }
}

/// Validates fields against per-entity field tables.
#[derive(Debug, Clone, Default)]
pub struct FieldSchemaValidator {
    schemas: HashMap<String, HashMap<String, FieldKind>>,
}

impl FieldSchemaValidator {
    /// Create a validator without schemas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the fields of `entity`.
    pub fn with_entity<'a>(
        mut self,
        entity: &str,
        fields: impl IntoIterator<Item = (&'a str, FieldKind)>,
    ) -> Self {
        let fields = fields
            .into_iter()
            .map(|(name, kind)| (name.to_string(), kind))
            .collect();
        self.schemas.insert(entity.to_string(), fields);
        self
    }

    /// Validator knowing the settable fields of a `Post`.
    pub fn with_post_schema() -> Self {
        Self::new().with_entity(
            "Post",
            [
                ("type", FieldKind::String),
                ("publishDate", FieldKind::Timestamp),
                ("title", FieldKind::String),
                ("description", FieldKind::String),
                ("tags", FieldKind::StringList),
                ("visibility", FieldKind::String),
                ("course", FieldKind::String),
                ("pinned", FieldKind::Boolean),
            ],
        )
    }
}

#[async_trait]
impl SchemaValidator for FieldSchemaValidator {
    async fn verify_schema(&self, entity: &str, fields: &Map<String, Value>) -> Result<()> {
        let schema = self
            .schemas
            .get(entity)
            .ok_or_else(|| Error::Validation(format!("Unknown entity: {}", entity)))?;

        for (name, value) in fields {
            let kind = schema
                .get(name)
                .ok_or_else(|| Error::Validation(format!("{}.{} is not a field", entity, name)))?;
            if !kind.accepts(value) {
                return Err(Error::Validation(format!(
                    "{}.{} must be {:?}",
                    entity, name, kind
                )));
            }
        }
        Ok(())
    }
}

/// In-memory post store.
#[derive(Default)]
pub struct MemoryPostRepository {
    posts: RwLock<HashMap<String, ContentPost>>,
}

impl MemoryPostRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a stored post.
    pub async fn get(&self, id: &str) -> Option<ContentPost> {
        self.posts.read().await.get(id).cloned()
    }

    /// Number of stored posts.
    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn create(&self, post: NewPost) -> Result<ContentPost> {
        let created = ContentPost {
            id: Uuid::new_v4().to_string(),
            author: post.author,
            post_type: post.post_type,
            publish_date: post.publish_date,
            fields: post.fields,
            attachment: None,
        };
        self.posts
            .write()
            .await
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.posts
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Post not found: {}", id)))
    }
}

/// In-memory attachment store.
#[derive(Default)]
pub struct MemoryAttachmentRepository {
    attachments: RwLock<HashMap<String, Attachment>>,
}

impl MemoryAttachmentRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a stored attachment.
    pub async fn get(&self, id: &str) -> Option<Attachment> {
        self.attachments.read().await.get(id).cloned()
    }

    /// Number of stored attachments.
    pub async fn len(&self) -> usize {
        self.attachments.read().await.len()
    }
}

#[async_trait]
impl AttachmentRepository for MemoryAttachmentRepository {
    async fn create(&self, attachment: NewAttachment) -> Result<Attachment> {
        let created = Attachment {
            id: Uuid::new_v4().to_string(),
            parent_type: attachment.parent_type,
            parent: attachment.parent,
            original_name: attachment.original_name,
            mime_type: attachment.mime_type,
        };
        self.attachments
            .write()
            .await
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.attachments
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Attachment not found: {}", id)))
    }
}

/// Issues upload URLs of the form `{base}/{attachment_id}?expires={unix}`.
pub struct PrefixUploadUrlIssuer {
    base: Url,
    ttl: Duration,
}

impl PrefixUploadUrlIssuer {
    /// Create an issuer writing under `base`.
    pub fn new(base: Url, ttl: Duration) -> Self {
        Self { base, ttl }
    }
}

#[async_trait]
impl UploadUrlIssuer for PrefixUploadUrlIssuer {
    async fn upload_url_for_attachment(&self, attachment_id: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("Upload base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(attachment_id);
        let expires = (Utc::now() + self.ttl).timestamp();
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string());
        Ok(url)
    }
}

/// A complete set of in-memory collaborators with typed handles.
pub struct MemoryBackend {
    pub users: Arc<MemoryUserDirectory>,
    pub schema: Arc<FieldSchemaValidator>,
    pub posts: Arc<MemoryPostRepository>,
    pub attachments: Arc<MemoryAttachmentRepository>,
    pub upload_urls: Arc<PrefixUploadUrlIssuer>,
}

impl MemoryBackend {
    /// Create empty stores uploading under `upload_base`.
    pub fn new(upload_base: Url, url_ttl: Duration) -> Self {
        Self {
            users: Arc::new(MemoryUserDirectory::new()),
            schema: Arc::new(FieldSchemaValidator::with_post_schema()),
            posts: Arc::new(MemoryPostRepository::new()),
            attachments: Arc::new(MemoryAttachmentRepository::new()),
            upload_urls: Arc::new(PrefixUploadUrlIssuer::new(upload_base, url_ttl)),
        }
    }

    /// Erase the concrete types for wiring into the services.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            users: self.users.clone(),
            schema: self.schema.clone(),
            posts: self.posts.clone(),
            attachments: self.attachments.clone(),
            upload_urls: self.upload_urls.clone(),
        }
    }
}
