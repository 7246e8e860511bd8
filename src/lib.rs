//! mnemon - schema-driven memory for AI agents
//!
//! One API over a vector index and a property graph: a YAML schema
//! registry drives validation and embedding anchors, a single-writer
//! indexer keeps both stores consistent, and a GraphRAG pipeline answers
//! unified searches with neighbor expansion and stable ordering.

pub mod config;
pub mod embedding;
pub mod error;
pub mod hrid;
pub mod pipeline;
pub mod schema;
pub mod service;
pub mod store;
pub mod types;

pub use config::Settings;
pub use error::{MnemonError, Result};
pub use schema::SchemaRegistry;
pub use service::MemoryService;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
