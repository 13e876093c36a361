use crate::image_reference::ParseError;
use crate::resources::ObjectKey;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while reconciling an ImageStreamTag into the OLSConfig
#[derive(Debug, Error)]
pub enum Error {
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("Failed to get ImageStreamTag {key}: {source}")]
    SourceFetch {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },
    #[error("ImageStreamTag {key} has an invalid dockerImageReference {reference:?}: {source}")]
    InvalidImageReference {
        key: ObjectKey,
        reference: String,
        #[source]
        source: ParseError,
    },
    #[error("Failed to get OLSConfig {key}: {source}")]
    TargetConfigFetch {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },
    #[error("OLSConfig {key} does not exist")]
    TargetConfigNotFound { key: ObjectKey },
    #[error("OLSConfig {key} has no RAG entry at index {index} ({len} configured)")]
    MissingRagEntry {
        key: ObjectKey,
        index: usize,
        len: usize,
    },
    #[error("OLSConfig {key} was modified concurrently")]
    UpdateConflict { key: ObjectKey },
    #[error("Failed to update OLSConfig {key}: {source}")]
    Update {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },
}

impl Error {
    /// Transient store failures and write conflicts may succeed on a fresh attempt.
    /// Everything else points at a broken installation or source object.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::SourceFetch { .. }
            | Error::TargetConfigFetch { .. }
            | Error::UpdateConflict { .. }
            | Error::Update { .. } => true,
            Error::MissingObjectKey(_)
            | Error::InvalidImageReference { .. }
            | Error::TargetConfigNotFound { .. }
            | Error::MissingRagEntry { .. } => false,
        }
    }
}
