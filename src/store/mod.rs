//! Store adapters
//!
//! Thin wrappers over the backing stores. The vector side holds points
//! with JSON payloads and answers filtered cosine searches; the graph side
//! holds dynamic per-type node tables and per-`(source, predicate, target)`
//! edge tables. Both are backed by SQLite here; the core never assumes
//! more than the adapter contracts.

pub mod filter;
pub mod graph;
pub mod vector;

pub use filter::{compile_filters, FilterCond};
pub use graph::{Direction, GraphStore, NeighborRow, PropertyType};
pub use vector::{PointRecord, ScoredPoint, VectorStore};
