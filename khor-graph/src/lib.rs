//! In-memory RDF quad store for the khor orchestrator.
//!
//! The store wraps an oxigraph [`Store`](oxigraph::store::Store) behind
//! copy-on-write snapshots: writers build a fresh store and swap an `Arc`,
//! readers keep whatever snapshot they took for the whole evaluation. A
//! snapshot can never observe a partial ingest.

pub mod csv_ingest;
pub mod error;
pub mod query;
pub mod store;
pub mod term;

pub use error::{GraphError, GraphResult};
pub use query::{QueryForm, detect_query_form};
pub use store::{GraphSnapshot, GraphStore};
pub use term::term_to_json;
