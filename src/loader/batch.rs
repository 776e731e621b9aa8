//! Pending-instance buffer with size-triggered bulk submission

use super::element::ExtractionTriple;
use crate::store::{RemoteStore, StoreError};
use crate::types::{ActionId, Instance, InstanceElement, TopologyId};

/// An instance waiting for the next flush.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInstance {
    pub action_id: ActionId,
    pub topology_id: TopologyId,
    pub triples: Vec<ExtractionTriple>,
}

impl PendingInstance {
    pub fn to_instance(&self) -> Instance {
        Instance::new(
            self.action_id,
            self.topology_id,
            self.triples
                .iter()
                .map(|t| InstanceElement::new(t.value.clone()))
                .collect(),
        )
    }
}

/// Accumulates instances and pushes them in chunks of at most `batch_size`.
#[derive(Debug)]
pub struct BatchAssembler {
    batch_size: usize,
    pending: Vec<PendingInstance>,
}

impl BatchAssembler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, instance: PendingInstance) {
        self.pending.push(instance);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True once a full batch is waiting.
    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    /// Submit the oldest `batch_size` instances (or all, if fewer).
    ///
    /// Returns how many were sent. Nothing is removed unless the store
    /// accepted the whole batch; there is no retry.
    pub async fn flush(&mut self, store: &dyn RemoteStore) -> Result<usize, (usize, StoreError)> {
        let count = self.pending.len().min(self.batch_size);
        if count == 0 {
            return Ok(0);
        }
        let instances: Vec<Instance> = self.pending[..count]
            .iter()
            .map(PendingInstance::to_instance)
            .collect();
        store
            .batch_create(&instances)
            .await
            .map_err(|e| (count, e))?;
        self.pending.drain(..count);
        Ok(count)
    }
}
