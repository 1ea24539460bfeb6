//! Document ingestion and the persistent vector index.

pub mod document;
pub mod index;

pub use index::{IndexError, SearchHit, VectorIndex};
