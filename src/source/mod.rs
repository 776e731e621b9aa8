//! Record sources the loader can walk
//!
//! Tabular input (CSV rows addressed by column) and hierarchical input
//! (XML elements addressed by path) behind one `RecordSource` trait.

mod markup;
mod path;
mod tabular;
mod traits;

pub use markup::{XmlEntity, XmlSource};
pub use tabular::{CsvOptions, CsvRow, CsvSource};
pub use traits::{Record, RecordSource, Selector, SourceError};
