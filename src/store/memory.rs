//! In-memory store that records every call
//!
//! Assigns sequential identities and keeps everything it was sent, in order.
//! Failures can be injected per operation, which is how the loader's error
//! paths are exercised. The CLI dry run uses it in place of the HTTP store.

use super::traits::{RemoteStore, StoreError, StoreResult};
use crate::types::{Action, ActionId, ComponentTag, Instance, Topology, TopologyId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// The store operations, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Close,
    CreateAction,
    CreateTopology,
    BatchCreate,
    Link,
}

/// One recorded call, in the order it was received.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Connect,
    Close,
    CreateAction(String),
    CreateTopology(Vec<ComponentTag>),
    BatchCreate(usize),
    Link(ActionId, TopologyId),
}

#[derive(Debug, Default)]
struct MemoryState {
    connected: bool,
    next_id: u64,
    calls: Vec<StoreCall>,
    actions: Vec<Action>,
    topologies: Vec<Topology>,
    batches: Vec<Vec<Instance>>,
    links: Vec<(ActionId, TopologyId)>,
    /// Operation -> call numbers (1-based) that fail; empty list fails every call.
    failures: HashMap<Operation, Vec<usize>>,
    counters: HashMap<Operation, usize>,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Count the call and decide whether an injected failure applies.
    fn check(&mut self, op: Operation) -> StoreResult<()> {
        let count = self.counters.entry(op).or_insert(0);
        *count += 1;
        let n = *count;
        match self.failures.get(&op) {
            Some(nths) if nths.is_empty() || nths.contains(&n) => Err(StoreError::Rejected {
                operation: format!("{:?}", op),
                message: format!("injected failure on call {}", n),
            }),
            _ => Ok(()),
        }
    }

    fn require_connection(&self) -> StoreResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }
}

/// A `RemoteStore` that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail.
    pub fn fail_on(self, op: Operation) -> Self {
        self.lock().failures.insert(op, Vec::new());
        self
    }

    /// Make only the `n`-th call (1-based) of `op` fail.
    pub fn fail_on_nth(self, op: Operation, n: usize) -> Self {
        self.lock().failures.entry(op).or_default().push(n);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    pub fn topologies(&self) -> Vec<Topology> {
        self.lock().topologies.clone()
    }

    pub fn links(&self) -> Vec<(ActionId, TopologyId)> {
        self.lock().links.clone()
    }

    /// Every successfully submitted batch, in order.
    pub fn batches(&self) -> Vec<Vec<Instance>> {
        self.lock().batches.clone()
    }

    /// All submitted instances, flattened.
    pub fn instances(&self) -> Vec<Instance> {
        self.lock().batches.iter().flatten().cloned().collect()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Number of recorded calls matching a predicate.
    pub fn count_calls(&self, pred: impl Fn(&StoreCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn connect(&self) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Connect);
        state.check(Operation::Connect)?;
        state.connected = true;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Close);
        state.connected = false;
        state.check(Operation::Close)
    }

    async fn create_action(&self, action: &Action) -> StoreResult<Action> {
        let mut state = self.lock();
        state.require_connection()?;
        state.calls.push(StoreCall::CreateAction(action.name.clone()));
        state.check(Operation::CreateAction)?;
        let created = action.clone().with_id(ActionId(state.next_id()));
        state.actions.push(created.clone());
        Ok(created)
    }

    async fn create_topology(&self, topology: &Topology) -> StoreResult<Topology> {
        let mut state = self.lock();
        state.require_connection()?;
        state
            .calls
            .push(StoreCall::CreateTopology(topology.components.clone()));
        state.check(Operation::CreateTopology)?;
        let mut created = topology.clone();
        created.id = Some(TopologyId(state.next_id()));
        state.topologies.push(created.clone());
        Ok(created)
    }

    async fn batch_create(&self, instances: &[Instance]) -> StoreResult<()> {
        let mut state = self.lock();
        state.require_connection()?;
        state.calls.push(StoreCall::BatchCreate(instances.len()));
        state.check(Operation::BatchCreate)?;
        state.batches.push(instances.to_vec());
        Ok(())
    }

    async fn link(&self, action: &Action, topology: &Topology) -> StoreResult<()> {
        let (Some(action_id), Some(topology_id)) = (action.id, topology.id) else {
            return Err(StoreError::Rejected {
                operation: "Link".to_string(),
                message: "action and topology must both have identities".to_string(),
            });
        };
        let mut state = self.lock();
        state.require_connection()?;
        state.calls.push(StoreCall::Link(action_id, topology_id));
        state.check(Operation::Link)?;
        state.links.push((action_id, topology_id));
        Ok(())
    }
}
