//! Common utilities and types shared across the Drive import crates.
//!
//! This module provides the error taxonomy, identifier newtypes and secret
//! wrappers used by the Google Drive client and the import services.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Secret, SubjectId, UserId, MAX_FILE_SIZE};
