//! Store interface
//!
//! A store accepts a compiled query (flat filter or pipeline) and returns
//! raw documents. Retries and timeouts belong to the caller.

mod errors;
mod matcher;
mod memory;
mod sorter;

pub use errors::{TransportError, TransportResult};
pub use matcher::{DocumentSource, FilterMatcher};
pub use memory::MemoryStore;
pub use sorter::{compare_values, get_path, DocumentSorter};

use serde_json::Value;

use crate::compiler::CompiledQuery;

/// Executes compiled queries
pub trait DocumentStore {
    fn fetch(&self, query: &CompiledQuery) -> TransportResult<Vec<Value>>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn fetch(&self, query: &CompiledQuery) -> TransportResult<Vec<Value>> {
        (**self).fetch(query)
    }
}
