//! Per-run topology table
//!
//! Each distinct component sequence is created remotely and linked to the
//! mapping's action exactly once. Later records with the same sequence reuse
//! the stored identity without touching the store.

use super::element::ExtractionTriple;
use super::observer::RunObserver;
use crate::store::{RemoteStore, StoreError};
use crate::types::{Action, ComponentTag, Topology, TopologyId};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Canonical key for a component sequence, e.g. `Who,What,When`.
///
/// Order matters; labels and values do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn from_components(components: &[ComponentTag]) -> Self {
        Self(
            components
                .iter()
                .map(ComponentTag::as_str)
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    pub fn of(triples: &[ExtractionTriple]) -> Self {
        let components: Vec<ComponentTag> = triples.iter().map(|t| t.component).collect();
        Self::from_components(&components)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A created topology: its remote identity and label list.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyHandle {
    pub id: TopologyId,
    pub labels: Vec<String>,
}

#[derive(Debug, Default)]
pub struct TopologyCache {
    mapping: String,
    entries: HashMap<Signature, TopologyHandle>,
    link_failures: usize,
}

impl TopologyCache {
    pub fn new(mapping: impl Into<String>) -> Self {
        Self {
            mapping: mapping.into(),
            ..Default::default()
        }
    }

    /// Number of topologies created so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn link_failures(&self) -> usize {
        self.link_failures
    }

    pub fn get(&self, signature: &Signature) -> Option<&TopologyHandle> {
        self.entries.get(signature)
    }

    /// Return the handle for `signature`, creating and linking it on first use.
    ///
    /// Only a failed create is an error. A failed link is logged, reported
    /// to the observer, and the entry is kept.
    pub async fn resolve(
        &mut self,
        store: &dyn RemoteStore,
        action: &Action,
        signature: Signature,
        triples: &[ExtractionTriple],
        observer: &dyn RunObserver,
    ) -> Result<&TopologyHandle, StoreError> {
        if self.entries.contains_key(&signature) {
            return Ok(&self.entries[&signature]);
        }

        let topology = Topology::new(
            triples.iter().map(|t| t.component).collect(),
            triples.iter().map(|t| t.label.clone()).collect(),
        );
        let created = store.create_topology(&topology).await?;
        let id = created.id.ok_or_else(|| {
            StoreError::Response(format!("created topology '{}' has no id", signature))
        })?;
        debug!(mapping = %self.mapping, %signature, topology_id = %id, "created topology");

        if let Err(e) = store.link(action, &created).await {
            warn!(
                mapping = %self.mapping,
                %signature,
                topology_id = %id,
                error = %e,
                "failed to link topology to action"
            );
            self.link_failures += 1;
            observer.link_failed(&self.mapping, &signature, &e);
        }

        let handle = TopologyHandle {
            id,
            labels: created.labels,
        };
        Ok(self.entries.entry(signature).or_insert(handle))
    }
}
