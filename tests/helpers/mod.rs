//! Shared test fixtures: an in-memory service over the demo registry

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use mnemon::config::Settings;
use mnemon::embedding::HashedBowEmbedder;
use mnemon::schema::SchemaRegistry;
use mnemon::service::MemoryService;
use mnemon::store::{GraphStore, VectorStore};

pub const DIM: usize = 384;

pub const REGISTRY: &str = r#"
version: v1
id_policy: {kind: uuid, field: id}
defaults:
  vector: {metric: cosine, normalize: true, dim: 384}
  timestamps: {auto_create: true, auto_update: true}
entities:
  - name: note
    description: Short free-form statement
    anchor: statement
    fields:
      statement: {type: string, required: true}
      title: {type: string}
      details: {type: string}
  - name: document
    anchor: statement
    fields:
      statement: {type: string, required: true}
      title: {type: string}
      details: {type: string}
  - name: task
    anchor: statement
    fields:
      statement: {type: string, required: true}
      status:
        type: enum
        choices: [backlog, todo, in_progress, in_review, done, cancelled]
      due_date: {type: date}
      priority: {type: int}
relations:
  - name: annotation
    predicates: [ANNOTATES]
    directed: true
    source: note
    target: [document, task]
  - name: task-ordering
    predicates: [BLOCKS, FOLLOWS]
    directed: true
    source: task
    target: task
  - name: similarity
    predicates: [RELATES_TO]
    directed: false
    source: "*"
    target: "*"
"#;

pub fn settings() -> Settings {
    Settings {
        vector_dimension: DIM,
        ..Settings::default()
    }
}

pub fn service() -> MemoryService {
    service_with_registry(REGISTRY)
}

pub fn service_with_registry(registry: &str) -> MemoryService {
    service_with_stores(
        registry,
        Arc::new(VectorStore::open_in_memory().unwrap()),
        Arc::new(GraphStore::open_in_memory().unwrap()),
    )
    .0
}

/// Build a service while keeping handles on the injected stores
pub fn service_with_stores(
    registry: &str,
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
) -> (MemoryService, Arc<VectorStore>, Arc<GraphStore>) {
    let settings = settings();
    let schema = Arc::new(SchemaRegistry::from_yaml_str(registry).unwrap());
    let service = MemoryService::new(
        &settings,
        schema,
        vector.clone(),
        graph.clone(),
        Arc::new(HashedBowEmbedder::new(DIM)),
    )
    .unwrap();
    (service, vector, graph)
}

pub fn payload(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
