//! Google Drive and identity-management clients for Drive imports.
//!
//! This crate talks to three upstreams:
//! - the identity-management API holding the user's linked Google identity
//! - Google's OAuth endpoints (refresh-token grant and token introspection)
//! - the Drive v3 files API (listing, download and PDF export)

pub mod auth;
pub mod client;
pub mod config;
pub mod identity;
pub mod mime;

pub use auth::{GoogleAuth, TokenInfo, DRIVE_READONLY_SCOPE};
pub use client::{DriveClient, DriveFile, FileContent, FileList};
pub use config::{GoogleConfig, HttpConfig, IdentityConfig};
pub use identity::{IdentityClient, LinkedIdentity};
pub use mime::ImportMode;
