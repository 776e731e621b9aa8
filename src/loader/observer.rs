//! Run observation hooks
//!
//! Skipped records and link failures never surface as errors. Callers that
//! care can attach an observer; the default one ignores everything.

use super::topology_cache::Signature;
use crate::store::StoreError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Why a record produced no instance.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// An element of the named set failed.
    ElementFailed { set: ElementSet, detail: String },
    /// The set produced fewer than two triples.
    TooFewTriples { set: ElementSet, count: usize },
}

/// Which element list a skip reason refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSet {
    Primary,
    Fallback,
}

/// Notifications emitted while a mapping runs.
pub trait RunObserver: Send + Sync {
    /// A record was dropped after both element sets failed.
    fn record_skipped(&self, _mapping: &str, _root: &str, _record_index: usize, _reason: &SkipReason) {}

    /// A new topology was created but could not be linked to its action.
    fn link_failed(&self, _mapping: &str, _signature: &Signature, _error: &StoreError) {}

    /// A batch of instances was pushed to the store.
    fn batch_flushed(&self, _mapping: &str, _count: usize) {}
}

/// Ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

/// Keeps running totals of every notification.
#[derive(Debug, Default)]
pub struct CountingObserver {
    skipped: AtomicUsize,
    link_failures: AtomicUsize,
    flushes: AtomicUsize,
    flushed_instances: AtomicUsize,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn link_failures(&self) -> usize {
        self.link_failures.load(Ordering::Relaxed)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn flushed_instances(&self) -> usize {
        self.flushed_instances.load(Ordering::Relaxed)
    }
}

impl RunObserver for CountingObserver {
    fn record_skipped(&self, _mapping: &str, _root: &str, _record_index: usize, _reason: &SkipReason) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn link_failed(&self, _mapping: &str, _signature: &Signature, _error: &StoreError) {
        self.link_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn batch_flushed(&self, _mapping: &str, count: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed_instances.fetch_add(count, Ordering::Relaxed);
    }
}
