//! Indexing and retrieval pipelines
//!
//! `indexer` is the single write path into both stores; `retrieval` is the
//! unified read path with mode selection, neighbor expansion, and stable
//! ordering.

pub mod indexer;
pub mod retrieval;

pub use indexer::Indexer;
pub use retrieval::RetrievalPipeline;
