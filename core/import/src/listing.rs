//! Listing of the Drive files a user can import.

use std::sync::Arc;
use tracing::debug;

use driveimport_common::{Result, SubjectId, UserId};
use driveimport_gdrive::{DriveClient, FileList};

use crate::token::TokenService;

/// Lists a user's importable Drive files.
pub struct FileListingService {
    tokens: Arc<TokenService>,
    drive: Arc<DriveClient>,
}

impl FileListingService {
    /// Create a new listing service.
    pub fn new(tokens: Arc<TokenService>, drive: Arc<DriveClient>) -> Self {
        Self { tokens, drive }
    }

    /// List one page of the user's own, non-trashed, importable files.
    ///
    /// Files whose declared size reaches the ceiling are dropped; files
    /// without a declared size are kept. The continuation token is passed
    /// through unchanged.
    pub async fn list_files(
        &self,
        user_id: &UserId,
        subject: &SubjectId,
        page_token: Option<&str>,
    ) -> Result<FileList> {
        let token = self.tokens.access_token(user_id, subject).await?;
        let mut list = self.drive.list_files(&token, page_token).await?;

        let listed = list.files.len();
        list.retain_within_size_limit();
        debug!(
            user = %user_id,
            listed,
            kept = list.files.len(),
            "Listed Drive files"
        );

        Ok(list)
    }
}
