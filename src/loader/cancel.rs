//! Cooperative cancellation for loader runs
//!
//! The loader polls the token between root passes. A pass that has started
//! always finishes; nothing is flushed once cancellation is seen.

use super::error::{LoaderError, LoaderResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request that the run stop at its next pass boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub(crate) fn check(&self) -> LoaderResult<()> {
        if self.is_cancelled() {
            Err(LoaderError::Cancelled)
        } else {
            Ok(())
        }
    }
}
