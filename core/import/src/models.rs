//! Domain records created and returned by the import flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use driveimport_common::{Error, Result, Secret, UserId};
use driveimport_gdrive::DriveFile;

/// Post type given to imported files.
pub const UPLOAD_NOTE: &str = "UPLOAD_NOTE";

/// Parent type recorded on attachments owned by a post.
pub const POST_PARENT_TYPE: &str = "Post";

/// Post fields owned by the import flow; overrides may not set them.
const RESERVED_POST_FIELDS: &[&str] = &["id", "author", "attachment"];

/// Internal user record, as far as Drive access is concerned.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: UserId,
    /// Google refresh token kept from the user's last consent.
    pub provider_refresh_token: Option<Secret>,
}

impl UserAccount {
    /// Create a user without a stored refresh token.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            provider_refresh_token: None,
        }
    }

    /// Set the stored refresh token.
    pub fn with_refresh_token(mut self, token: Secret) -> Self {
        self.provider_refresh_token = Some(token);
        self
    }
}

/// Data for a post about to be created.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author: UserId,
    pub post_type: String,
    pub publish_date: DateTime<Utc>,
    /// Additional schema fields.
    pub fields: Map<String, Value>,
}

impl NewPost {
    /// An uploaded note by `author`, published now.
    pub fn uploaded_note(author: UserId) -> Self {
        Self {
            author,
            post_type: UPLOAD_NOTE.to_string(),
            publish_date: Utc::now(),
            fields: Map::new(),
        }
    }

    /// Merge caller overrides over the defaults.
    ///
    /// `type` and `publishDate` replace the defaults; other keys are kept as
    /// extra fields.
    ///
    /// # Errors
    /// - `Validation` if a reserved field is overridden or a typed field is malformed
    pub fn with_overrides(mut self, overrides: &Map<String, Value>) -> Result<Self> {
        for (key, value) in overrides {
            match key.as_str() {
                "type" => {
                    self.post_type = value
                        .as_str()
                        .ok_or_else(|| Error::Validation("Post.type must be a string".to_string()))?
                        .to_string();
                }
                "publishDate" => {
                    self.publish_date = serde_json::from_value(value.clone()).map_err(|e| {
                        Error::Validation(format!("Post.publishDate is not a timestamp: {}", e))
                    })?;
                }
                reserved if RESERVED_POST_FIELDS.contains(&reserved) => {
                    return Err(Error::Validation(format!(
                        "Post.{} cannot be overridden",
                        reserved
                    )));
                }
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(self)
    }
}

/// A persisted post.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPost {
    pub id: String,
    pub author: UserId,
    #[serde(rename = "type")]
    pub post_type: String,
    pub publish_date: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Present on posts returned by an import; never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentView>,
}

/// Data for an attachment about to be created.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub parent_type: String,
    pub parent: String,
    pub original_name: String,
    pub mime_type: String,
}

impl NewAttachment {
    /// Attachment owned by the post with id `post_id`.
    pub fn for_post(
        post_id: impl Into<String>,
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            parent_type: POST_PARENT_TYPE.to_string(),
            parent: post_id.into(),
            original_name: original_name.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// A persisted attachment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub parent_type: String,
    pub parent: String,
    pub original_name: String,
    pub mime_type: String,
}

/// Attachment plus the storage URL its content was written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentView {
    #[serde(flatten)]
    pub attachment: Attachment,
    pub url: Url,
}

/// Body of an import request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub set_fields: Option<Map<String, Value>>,
}
