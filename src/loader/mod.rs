//! Mapping engine
//!
//! Turns the records of a source into actions, topologies and instances on
//! a remote store. A [`Mapping`] says where the records live and which
//! [`ExtractionElement`]s read them; the [`Loader`] walks every mapping in
//! order, deduplicating topologies per run and pushing instances in batches.

mod batch;
mod cancel;
mod element;
mod error;
#[cfg(test)]
mod integration_tests;
mod mapping;
mod observer;
mod run;
mod topology_cache;
mod transform;
mod variable;
mod walker;

pub use batch::{BatchAssembler, PendingInstance};
pub use cancel::CancellationToken;
pub use element::{
    CombinationElement, ExtractionElement, ExtractionTriple, FixedElement, PathElement, VariableElement,
    DEFAULT_NA_VALUES,
};
pub use error::{LoaderError, LoaderResult};
pub use mapping::{Mapping, DEFAULT_BATCH_SIZE};
pub use observer::{CountingObserver, ElementSet, RunObserver, SilentObserver, SkipReason};
pub use run::{Loader, RunStats, Survey};
pub use topology_cache::{Signature, TopologyCache, TopologyHandle};
pub use transform::{Combinator, Transform};
pub use variable::{CartesianProduct, Combination, Combinations, LoopVariable, TemplateError, VariableExpander};
pub use walker::MIN_TRIPLES;
