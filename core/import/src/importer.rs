//! Import of Drive files as posts with attachments.
//!
//! Files are processed one at a time: fetch, validate overrides, create the
//! post, create the attachment, upload. A failure aborts the batch. Posts
//! finished before the failure stay in place; the failing file's own post
//! and attachment are deleted so no attachment points at a missing blob.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use driveimport_common::{Result, Secret, SubjectId, UserId};
use driveimport_gdrive::{DriveClient, DriveFile, FileContent};

use crate::collaborators::Collaborators;
use crate::models::{AttachmentView, ContentPost, NewAttachment, NewPost};
use crate::token::TokenService;
use crate::upload::BlobUploader;

/// Schema entity name of posts.
const POST_ENTITY: &str = "Post";

/// Imports Drive files into posts.
pub struct FileImportService {
    tokens: Arc<TokenService>,
    drive: Arc<DriveClient>,
    uploader: BlobUploader,
    collaborators: Collaborators,
}

impl FileImportService {
    /// Create a new import service.
    pub fn new(
        tokens: Arc<TokenService>,
        drive: Arc<DriveClient>,
        uploader: BlobUploader,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            tokens,
            drive,
            uploader,
            collaborators,
        }
    }

    /// Import `files` for `user_id`, one post per file, in input order.
    ///
    /// # Errors
    /// - `Validation` if `overrides` violate the post schema
    /// - `PayloadTooLarge` if a file exceeds the size ceiling
    /// - any token, Drive, persistence or upload error
    pub async fn import_files(
        &self,
        user_id: &UserId,
        subject: &SubjectId,
        files: &[DriveFile],
        overrides: Option<&Map<String, Value>>,
    ) -> Result<Vec<ContentPost>> {
        info!(user = %user_id, files = files.len(), "Importing Drive files");

        let token = self.tokens.access_token(user_id, subject).await?;

        let mut posts = Vec::with_capacity(files.len());
        for file in files {
            let post = self.import_one(user_id, &token, file, overrides).await?;
            posts.push(post);
        }

        info!(user = %user_id, posts = posts.len(), "Drive import complete");
        Ok(posts)
    }

    async fn import_one(
        &self,
        user_id: &UserId,
        token: &Secret,
        file: &DriveFile,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<ContentPost> {
        let content = self.drive.fetch_content(token, file).await?;

        let mut new_post = NewPost::uploaded_note(user_id.clone());
        if let Some(fields) = overrides {
            self.collaborators
                .schema
                .verify_schema(POST_ENTITY, fields)
                .await?;
            new_post = new_post.with_overrides(fields)?;
        }

        let mut post = self.collaborators.posts.create(new_post).await?;
        let name = content.mode.display_name(&file.name);

        match self
            .store_attachment(&post.id, name, &file.mime_type, content)
            .await
        {
            Ok(view) => {
                debug!(post = %post.id, attachment = %view.attachment.id, "Imported Drive file");
                post.attachment = Some(view);
                Ok(post)
            }
            Err(e) => {
                if let Err(cleanup) = self.collaborators.posts.delete(&post.id).await {
                    warn!(post = %post.id, "Failed to delete post of failed import: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// Create the attachment record and upload its content.
    ///
    /// The record carries the fetched content's type; the upload is tagged
    /// with the file's Drive type. The record is deleted again if the upload
    /// does not complete.
    async fn store_attachment(
        &self,
        post_id: &str,
        name: String,
        source_mime_type: &str,
        content: FileContent,
    ) -> Result<AttachmentView> {
        let attachment = self
            .collaborators
            .attachments
            .create(NewAttachment::for_post(post_id, name, content.mime_type.as_str()))
            .await?;

        match self
            .upload_content(&attachment.id, source_mime_type, content)
            .await
        {
            Ok(url) => Ok(AttachmentView { attachment, url }),
            Err(e) => {
                if let Err(cleanup) = self.collaborators.attachments.delete(&attachment.id).await {
                    warn!(
                        attachment = %attachment.id,
                        "Failed to delete attachment of failed upload: {}", cleanup
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_content(
        &self,
        attachment_id: &str,
        content_type: &str,
        content: FileContent,
    ) -> Result<Url> {
        let url = self
            .collaborators
            .upload_urls
            .upload_url_for_attachment(attachment_id)
            .await?;
        self.uploader.put(&url, content.data, content_type).await?;
        Ok(url)
    }
}
