//! dynaload: record-to-entity loader
//!
//! Reads tabular (CSV) and hierarchical (XML) records and turns them into
//! actions, topologies and instances on a remote store.
//!
//! # Core Concepts
//!
//! - **Action**: the kind of thing that happened (a sale, a reading)
//! - **Topology**: the ordered component roles (`Who`, `What`, `Where`,
//!   `When`) one instance fills, with a label per role
//! - **Instance**: one occurrence of an action, holding typed values in
//!   topology order
//! - **Mapping**: which records to walk and which extraction elements read
//!   them
//!
//! # Example
//!
//! ```
//! use dynaload::{Action, ComponentTag, CsvOptions, CsvSource, DataType, Loader, Mapping, MemoryStore, PathElement};
//!
//! let source = CsvSource::parse("ann,3\nben,5\n", &CsvOptions::default()).unwrap();
//! let mapping = Mapping::new(Action::new("sale", "transaction"), "/")
//!     .with_element(PathElement::new(0usize, ComponentTag::Who, DataType::String, "buyer"))
//!     .with_element(PathElement::new(1usize, ComponentTag::What, DataType::Integer, "qty"));
//!
//! let store = MemoryStore::new();
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let stats = runtime
//!     .block_on(Loader::new(vec![mapping]).run(&source, &store))
//!     .unwrap();
//! assert_eq!(stats[0].instances, 2);
//! ```

pub mod config;
pub mod loader;
pub mod source;
pub mod store;
pub mod types;

pub use config::{LoaderConfig, OpenedSource, SourceConfig};
pub use loader::{
    CancellationToken, CombinationElement, Combinator, CountingObserver, ExtractionElement, ExtractionTriple,
    FixedElement, Loader, LoaderError, LoaderResult, LoopVariable, Mapping, PathElement, RunObserver, RunStats,
    Signature, SilentObserver, SkipReason, Survey, Transform, VariableElement,
};
pub use source::{CsvOptions, CsvSource, Record, RecordSource, Selector, SourceError, XmlSource};
pub use store::{HttpStore, HttpStoreConfig, MemoryStore, RemoteStore, StoreError, StoreResult};
pub use types::{
    Action, ActionId, ComponentTag, DataType, Instance, InstanceElement, Topology, TopologyId, TypedValue,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
