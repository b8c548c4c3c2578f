//! Google Drive import services.
//!
//! Turns a user's Drive files into posts with attachments:
//! - [`TokenService`] keeps a usable Google access token for the user
//! - [`FileListingService`] lists the files eligible for import
//! - [`FileImportService`] copies selected files into object storage
//! - [`DriveEndpoints`] exposes the three operations with HTTP semantics
//!
//! Persistence, schema validation and signed URLs are collaborators behind
//! the traits in [`collaborators`]; [`memory`] holds in-process versions.

pub mod collaborators;
pub mod config;
pub mod endpoints;
pub mod importer;
pub mod listing;
pub mod memory;
pub mod models;
pub mod token;
pub mod upload;

pub use collaborators::{
    AttachmentRepository, Collaborators, PostRepository, SchemaValidator, UploadUrlIssuer,
    UserDirectory,
};
pub use config::{AppConfig, StorageConfig};
pub use endpoints::{status_for_error, AuthContext, DriveEndpoints, Response};
pub use importer::FileImportService;
pub use listing::FileListingService;
pub use models::{
    Attachment, AttachmentView, ContentPost, ImportRequest, NewAttachment, NewPost, UserAccount,
};
pub use token::TokenService;
pub use upload::BlobUploader;
