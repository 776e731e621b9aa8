//! Remote store backends
//!
//! The loader talks to the store only through the `RemoteStore` trait.
//! `HttpStore` is the production client; `MemoryStore` records calls for
//! tests and dry runs.

mod http;
mod memory;
mod traits;

pub use http::{HttpStore, HttpStoreConfig};
pub use memory::{MemoryStore, Operation, StoreCall};
pub use traits::{RemoteStore, StoreError, StoreResult};
