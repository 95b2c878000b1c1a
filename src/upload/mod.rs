//! Upload pipeline: collaborator seams plus the coordinator that drives them.
//!
//! The coordinator only depends on the three traits below. Default
//! implementations hash with BLAKE3, walk directories with `walkdir`, and
//! post files over HTTP with `reqwest`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{ledger::Fingerprint, Result};

pub mod coordinator;
pub mod enumerator;
pub mod hasher;
pub mod http;

pub use coordinator::{CoordinatorOptions, UploadCoordinator, UploadReport};
pub use enumerator::WalkDirEnumerator;
pub use hasher::Blake3Hasher;
pub use http::HttpUploader;

/// Lazy stream of candidate file paths.
pub type FileStream = Box<dyn Iterator<Item = Result<PathBuf>>>;

pub trait ContentHasher {
    /// Fails with [`crate::Error::NoSuchFile`] when `path` does not exist.
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint>;
}

pub trait FileEnumerator {
    fn files(&self, root: &Path) -> Result<FileStream>;
}

pub trait Uploader {
    fn upload(&mut self, path: &Path) -> std::result::Result<(), UploadError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("authentication rejected: {0}")]
    Authentication(String),
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl UploadError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, UploadError::Authentication(_))
    }
}
