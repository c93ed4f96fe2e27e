use super::placement::MediaCategory;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the archive lifecycle operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The declared content subtype maps to no media category. Raised before any write.
    #[error("Unknown media category for content type '{content_type}'")]
    UnknownCategory { content_type: String },

    /// The upload is a known category, but not the one this operation stores.
    #[error("Expected a {expected} upload, got {actual}")]
    CategoryMismatch {
        expected: MediaCategory,
        actual: MediaCategory,
    },

    /// Placement for this category needs a collection id that was not supplied.
    #[error("A collection id is required to place {category} artifacts")]
    MissingOwner { category: MediaCategory },

    #[error("Invalid identifier '{id}'")]
    InvalidIdentifier { id: String },

    #[error("Storage unavailable at {path:?}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} '{id}' not found")]
    RecordNotFound { kind: &'static str, id: String },

    /// `hasBundle` may only be raised once the bundle file is on disk.
    #[error("No bundle file on disk for collection '{collection_id}'")]
    BundleMissing { collection_id: String },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] anyhow::Error),
}

impl ArchiveError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ArchiveError::RecordNotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
