//! Record source abstractions

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while reading or addressing a record source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("invalid source option: {0}")]
    InvalidOption(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub(crate) fn invalid_locator(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLocator {
            locator: locator.into(),
            reason: reason.into(),
        }
    }
}

/// Addresses a field within one record.
///
/// Tabular records understand `Index` (column number). Hierarchical records
/// understand both: `Index` selects the n-th child element, `Path` is a
/// relative element path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    Index(usize),
    Path(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{}", i),
            Self::Path(p) => f.write_str(p),
        }
    }
}

impl From<usize> for Selector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Selector {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

/// One entity or row.
pub trait Record {
    /// All values matched by `selector`, in source order.
    ///
    /// An empty vector means "not present"; a present-but-empty field
    /// yields `[""]`. An `Err` means the selector cannot be evaluated
    /// against this kind of record at all.
    fn lookup(&self, selector: &Selector) -> Result<Vec<String>, SourceError>;
}

/// A parsed source the loader can walk.
pub trait RecordSource {
    type Record<'a>: Record
    where
        Self: 'a;

    /// The child entities (or rows) of the first node matching `root`.
    ///
    /// A root that matches nothing is an `InvalidLocator` error.
    fn entities<'a>(&'a self, root: &str) -> Result<Vec<Self::Record<'a>>, SourceError>;

    /// Every node matching `path`; each becomes one loop-variable scope.
    fn scopes<'a>(&'a self, path: &str) -> Result<Vec<Self::Record<'a>>, SourceError>;
}
