//! Loader error types

use crate::source::SourceError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that abort a mapping (or the whole run).
///
/// Per-record extraction failures never show up here: they are absorbed by
/// the fallback element set or silently skip the record.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("mapping '{mapping}': invalid locator '{locator}': {reason}")]
    InvalidLocator {
        mapping: String,
        locator: String,
        reason: String,
    },

    #[error("mapping '{mapping}': failed to create {entity}: {source}")]
    EntityCreate {
        mapping: String,
        entity: String,
        source: StoreError,
    },

    #[error("mapping '{mapping}': failed to push batch of {count} instances: {source}")]
    BatchFlush {
        mapping: String,
        count: usize,
        source: StoreError,
    },

    #[error("mapping '{mapping}': unbound variable: {reason}")]
    UnboundVariable { mapping: String, reason: String },

    #[error("mapping '{mapping}': {source}")]
    Source { mapping: String, source: SourceError },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,
}

impl LoaderError {
    /// Attach the mapping name to a source failure.
    ///
    /// Unresolvable locators become `InvalidLocator`; anything else stays a
    /// `Source` error.
    pub(crate) fn from_source(mapping: &str, err: SourceError) -> Self {
        match err {
            SourceError::InvalidLocator { locator, reason } => Self::InvalidLocator {
                mapping: mapping.to_string(),
                locator,
                reason,
            },
            other => Self::Source {
                mapping: mapping.to_string(),
                source: other,
            },
        }
    }

    /// The mapping this error belongs to, if any.
    pub fn mapping(&self) -> Option<&str> {
        match self {
            Self::InvalidLocator { mapping, .. }
            | Self::EntityCreate { mapping, .. }
            | Self::BatchFlush { mapping, .. }
            | Self::UnboundVariable { mapping, .. }
            | Self::Source { mapping, .. } => Some(mapping),
            Self::Store(_) | Self::Config(_) | Self::Cancelled => None,
        }
    }
}

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;
