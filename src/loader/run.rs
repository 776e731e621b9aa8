//! The loader: drives mappings against a source and a store
//!
//! Mappings run one after another in declaration order. Each mapping owns
//! its topology cache and batch buffer for the duration of its run; nothing
//! is shared between mappings except the store connection.

use super::batch::{BatchAssembler, PendingInstance};
use super::cancel::CancellationToken;
use super::element::ElementError;
use super::error::{LoaderError, LoaderResult};
use super::mapping::Mapping;
use super::observer::{ElementSet, RunObserver, SilentObserver};
use super::topology_cache::{Signature, TopologyCache};
use super::variable::{Combination, VariableExpander};
use super::walker::{walk_record, RecordOutcome};
use crate::source::RecordSource;
use crate::store::{RemoteStore, StoreError};
use crate::types::{Action, ActionId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Totals for one completed mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub mapping: String,
    pub action_id: Option<ActionId>,
    /// Concrete roots walked (one per combination).
    pub passes: usize,
    pub records: usize,
    pub instances: usize,
    pub skipped: usize,
    /// Records accepted by the fallback list.
    pub fallback_used: usize,
    pub topologies: usize,
    pub link_failures: usize,
    pub flushes: usize,
}

/// What a mapping would walk, computed without touching the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Survey {
    pub mapping: String,
    pub combinations: usize,
    pub records: usize,
}

pub struct Loader {
    mappings: Vec<Mapping>,
    observer: Arc<dyn RunObserver>,
    cancel: CancellationToken,
}

impl Loader {
    pub fn new(mappings: Vec<Mapping>) -> Self {
        Self {
            mappings,
            observer: Arc::new(SilentObserver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Validate every mapping without touching the store.
    pub fn validate(&self) -> LoaderResult<()> {
        self.mappings.iter().try_for_each(Mapping::validate)
    }

    /// Count combinations and records per mapping.
    ///
    /// Resolves every root the way a run would, so locator problems show up
    /// here too.
    pub fn survey<S: RecordSource>(&self, source: &S) -> LoaderResult<Vec<Survey>> {
        self.validate()?;
        self.mappings
            .iter()
            .map(|mapping| {
                let lift = |e| LoaderError::from_source(&mapping.name, e);
                let expander = VariableExpander::expand(source, &mapping.loop_variables).map_err(lift)?;
                let mut records = 0;
                for combination in expander.combinations() {
                    let root = combination
                        .instantiate(&mapping.root)
                        .map_err(|e| LoaderError::UnboundVariable {
                            mapping: mapping.name.clone(),
                            reason: e.to_string(),
                        })?;
                    records += source.entities(&root).map_err(lift)?.len();
                }
                Ok(Survey {
                    mapping: mapping.name.clone(),
                    combinations: expander.len(),
                    records,
                })
            })
            .collect()
    }

    /// Run every mapping; the first failure aborts the rest.
    ///
    /// The store is closed whether or not the run succeeds.
    pub async fn run<S: RecordSource>(&self, source: &S, store: &dyn RemoteStore) -> LoaderResult<Vec<RunStats>> {
        self.validate()?;
        store.connect().await?;

        let mut stats = Vec::with_capacity(self.mappings.len());
        let mut outcome = Ok(());
        for mapping in &self.mappings {
            match self.run_mapping(mapping, source, store).await {
                Ok(s) => stats.push(s),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        let closed = close(store, outcome.is_err()).await;
        outcome?;
        closed?;
        Ok(stats)
    }

    /// Run every mapping independently, collecting one result per mapping.
    ///
    /// Only a failed connect fails the call as a whole; a failed close is
    /// logged and the collected results are still returned. Cancellation
    /// fails the mapping in progress and every one after it.
    pub async fn run_each<S: RecordSource>(
        &self,
        source: &S,
        store: &dyn RemoteStore,
    ) -> LoaderResult<Vec<LoaderResult<RunStats>>> {
        store.connect().await?;

        let mut results = Vec::with_capacity(self.mappings.len());
        for mapping in &self.mappings {
            let result = match mapping.validate() {
                Ok(()) => self.run_mapping(mapping, source, store).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!(mapping = %mapping.name, error = %e, "mapping failed");
            }
            results.push(result);
        }

        close(store, true).await?;
        Ok(results)
    }

    async fn run_mapping<S: RecordSource>(
        &self,
        mapping: &Mapping,
        source: &S,
        store: &dyn RemoteStore,
    ) -> LoaderResult<RunStats> {
        self.cancel.check()?;
        info!(mapping = %mapping.name, root = %mapping.root, "mapping started");

        let expander = VariableExpander::expand(source, &mapping.loop_variables)
            .map_err(|e| LoaderError::from_source(&mapping.name, e))?;

        let action = store
            .create_action(&mapping.action)
            .await
            .and_then(|a| match a.id {
                Some(_) => Ok(a),
                None => Err(StoreError::Response("created action has no id".to_string())),
            })
            .map_err(|source| LoaderError::EntityCreate {
                mapping: mapping.name.clone(),
                entity: format!("action '{}'", mapping.action.name),
                source,
            })?;

        let mut run = MappingRun::new(mapping, store, self.observer.as_ref(), action);

        for combination in expander.combinations() {
            self.cancel.check()?;
            let root = combination
                .instantiate(&mapping.root)
                .map_err(|e| LoaderError::UnboundVariable {
                    mapping: mapping.name.clone(),
                    reason: e.to_string(),
                })?;
            run.pass(source, &root, &combination).await?;
            while run.batch.is_full() {
                run.flush().await?;
            }
        }
        while !run.batch.is_empty() {
            run.flush().await?;
        }

        let stats = run.finish();
        info!(
            mapping = %stats.mapping,
            passes = stats.passes,
            instances = stats.instances,
            skipped = stats.skipped,
            topologies = stats.topologies,
            "mapping finished"
        );
        Ok(stats)
    }
}

async fn close(store: &dyn RemoteStore, quiet: bool) -> LoaderResult<()> {
    match store.close().await {
        Ok(()) => Ok(()),
        // the caller already has something better to return
        Err(e) if quiet => {
            warn!(error = %e, "failed to close store");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// One mapping in flight
// ---------------------------------------------------------------------------

struct MappingRun<'a> {
    mapping: &'a Mapping,
    store: &'a dyn RemoteStore,
    observer: &'a dyn RunObserver,
    action: Action,
    action_id: ActionId,
    cache: TopologyCache,
    batch: BatchAssembler,
    stats: RunStats,
}

impl<'a> MappingRun<'a> {
    fn new(mapping: &'a Mapping, store: &'a dyn RemoteStore, observer: &'a dyn RunObserver, action: Action) -> Self {
        let action_id = action.id.unwrap_or(ActionId(0));
        Self {
            mapping,
            store,
            observer,
            cache: TopologyCache::new(&mapping.name),
            batch: BatchAssembler::new(mapping.batch_size),
            stats: RunStats {
                mapping: mapping.name.clone(),
                action_id: action.id,
                ..Default::default()
            },
            action,
            action_id,
        }
    }

    /// Walk every record under one concrete root.
    async fn pass<S: RecordSource>(&mut self, source: &S, root: &str, combination: &Combination) -> LoaderResult<()> {
        let mapping = self.mapping;
        let name = &mapping.name;
        let records = source
            .entities(root)
            .map_err(|e| LoaderError::from_source(name, e))?;
        debug!(mapping = %name, %root, records = records.len(), "walking root");
        self.stats.passes += 1;

        for (index, record) in records.iter().enumerate() {
            self.stats.records += 1;
            let outcome = walk_record(&mapping.elements, &mapping.fallback, record, combination)
                .map_err(|e| element_error(name, e))?;

            let (set, triples) = match outcome {
                RecordOutcome::Accepted { set, triples } => (set, triples),
                RecordOutcome::Skipped(reason) => {
                    trace!(mapping = %name, %root, record = index, ?reason, "record skipped");
                    self.stats.skipped += 1;
                    self.observer.record_skipped(name, root, index, &reason);
                    continue;
                }
            };
            if set == ElementSet::Fallback {
                self.stats.fallback_used += 1;
            }

            let signature = Signature::of(&triples);
            let topology_id = self
                .cache
                .resolve(self.store, &self.action, signature.clone(), &triples, self.observer)
                .await
                .map_err(|source| LoaderError::EntityCreate {
                    mapping: name.clone(),
                    entity: format!("topology '{}'", signature),
                    source,
                })?
                .id;

            self.batch.push(PendingInstance {
                action_id: self.action_id,
                topology_id,
                triples,
            });
        }
        Ok(())
    }

    async fn flush(&mut self) -> LoaderResult<()> {
        let mapping = self.mapping;
        let name = mapping.name.as_str();
        let count = self
            .batch
            .flush(self.store)
            .await
            .map_err(|(count, source)| LoaderError::BatchFlush {
                mapping: name.to_string(),
                count,
                source,
            })?;
        self.stats.flushes += 1;
        self.stats.instances += count;
        info!(mapping = %name, count, "flushed instances");
        self.observer.batch_flushed(name, count);
        Ok(())
    }

    fn finish(mut self) -> RunStats {
        self.stats.topologies = self.cache.len();
        self.stats.link_failures = self.cache.link_failures();
        self.stats
    }
}

fn element_error(mapping: &str, err: ElementError) -> LoaderError {
    match err {
        ElementError::Unbound {
            label,
            loop_index,
            variable_index,
        } => LoaderError::UnboundVariable {
            mapping: mapping.to_string(),
            reason: format!(
                "element '{}' reads slot {}.{} which the combination does not provide",
                label, loop_index, variable_index
            ),
        },
        ElementError::Source(e) => LoaderError::from_source(mapping, e),
    }
}
