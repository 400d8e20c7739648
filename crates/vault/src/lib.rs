pub mod document;
pub mod scanner;

use std::path::PathBuf;

use thiserror::Error;

pub use document::{Document, TagValue};
pub use scanner::{IGNORED_DIRS, VaultScanner};

/// Errors raised while reading or writing vault documents.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The document could not be decoded or its front matter is malformed.
    /// Always fatal for that document; callers skip it.
    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;
