//! Indexer: the deterministic add-memory pipeline, single writer
//!
//! Anchor text comes from the schema registry (override wins), the
//! embedding is always computed from anchor text, the vector point goes in
//! first, then the graph node. A graph failure after a vector success
//! surfaces as a partial write naming the orphaned point; there is no
//! automatic rollback.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{MnemonError, Result};
use crate::hrid::HridAllocator;
use crate::schema::SchemaRegistry;
use crate::store::{GraphStore, VectorStore};
use crate::types::Memory;

/// Core fields every graph node carries, beyond the schema's primitive
/// payload projection.
pub const NODE_CORE_FIELDS: &[&str] = &[
    "id",
    "hrid",
    "user_id",
    "memory_type",
    "tags",
    "created_at",
    "updated_at",
    "is_valid",
    "supersedes",
    "superseded_by",
];

/// Single-writer dual-store indexer
pub struct Indexer {
    schema: Arc<SchemaRegistry>,
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    embedder: Arc<dyn Embedder>,
    hrids: Arc<HridAllocator>,
    collection: String,
    dim: usize,
}

impl Indexer {
    pub fn new(
        schema: Arc<SchemaRegistry>,
        vector: Arc<VectorStore>,
        graph: Arc<GraphStore>,
        embedder: Arc<dyn Embedder>,
        hrids: Arc<HridAllocator>,
        collection: impl Into<String>,
        dim: usize,
    ) -> Self {
        Self {
            schema,
            vector,
            graph,
            embedder,
            hrids,
            collection: collection.into(),
            dim,
        }
    }

    /// Persist a memory into both stores. Returns the point/node id.
    ///
    /// Indexing is a pure function of `(memory, anchor_text, embedder)`:
    /// identical inputs produce identical vectors and node properties.
    pub fn index(&self, memory: &mut Memory, index_text_override: Option<&str>) -> Result<String> {
        // 1. Resolve anchor text; the override wins
        let anchor = match index_text_override {
            Some(text) => text.trim().to_string(),
            None => self.schema.anchor_text(memory)?,
        };
        if anchor.is_empty() {
            return Err(MnemonError::InvalidInput(format!(
                "empty anchor text for memory type '{}'",
                memory.memory_type
            )));
        }

        // 2. Allocate an HRID if the memory has none
        if memory.hrid.is_none() {
            seed_hrid_space(&self.hrids, &self.graph, &memory.user_id, &memory.memory_type)?;
            memory.hrid = Some(
                self.hrids
                    .next(&memory.memory_type, &memory.user_id, &memory.id)?,
            );
        }

        // 3. Embed and verify the dimension contract
        let vector = self.embed_anchor(&anchor)?;

        // 4-5. Vector point first (cheap to delete if the graph write fails)
        self.vector.ensure_collection(&self.collection, self.dim)?;
        self.vector
            .upsert(&self.collection, &memory.id, &vector, &memory.to_point_payload())?;

        // 6-7. Mirror the node into the graph
        let node_props = self.node_properties(memory)?;
        if let Err(e) = self.graph.add_node(&memory.memory_type, &node_props) {
            return Err(MnemonError::PartialWrite {
                side: "vector",
                point_id: memory.id.clone(),
                message: e.to_string(),
            });
        }

        memory.vector = Some(vector);
        debug!(
            id = %memory.id,
            hrid = memory.hrid.as_deref().unwrap_or_default(),
            memory_type = %memory.memory_type,
            "indexed memory"
        );
        Ok(memory.id.clone())
    }

    /// Embed anchor text and enforce the dimension contract
    pub fn embed_anchor(&self, anchor: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(anchor)?;
        if vector.len() != self.dim {
            return Err(MnemonError::InvalidInput(format!(
                "embedder returned dimension {}, configured {}",
                vector.len(),
                self.dim
            )));
        }
        Ok(vector)
    }

    /// Graph node properties: flattened core fields plus the schema's
    /// primitive payload projection. The vector never goes on the node.
    pub fn node_properties(&self, memory: &Memory) -> Result<HashMap<String, Value>> {
        let mut props: HashMap<String, Value> = HashMap::new();
        props.insert("id".to_string(), Value::String(memory.id.clone()));
        props.insert(
            "hrid".to_string(),
            memory.hrid.clone().map(Value::String).unwrap_or(Value::Null),
        );
        props.insert("user_id".to_string(), Value::String(memory.user_id.clone()));
        props.insert(
            "memory_type".to_string(),
            Value::String(memory.memory_type.clone()),
        );
        props.insert("tags".to_string(), Value::String(memory.tags.join(",")));
        props.insert(
            "created_at".to_string(),
            Value::String(memory.created_at.to_rfc3339()),
        );
        props.insert(
            "updated_at".to_string(),
            Value::String(memory.updated_at.to_rfc3339()),
        );
        props.insert("is_valid".to_string(), Value::Bool(memory.is_valid));
        props.insert(
            "supersedes".to_string(),
            memory.supersedes.clone().map(Value::String).unwrap_or(Value::Null),
        );
        props.insert(
            "superseded_by".to_string(),
            memory
                .superseded_by
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );

        for field in self.schema.primitive_fields(&memory.memory_type)? {
            if let Some(value) = memory.payload.get(&field) {
                props.insert(field, value.clone());
            }
        }
        Ok(props)
    }
}

/// Seed the HRID counters for `(user, type)` from the graph on first use.
/// Counter state is process-local; persistence rides on node properties.
pub fn seed_hrid_space(
    hrids: &HridAllocator,
    graph: &GraphStore,
    user_id: &str,
    memory_type: &str,
) -> Result<()> {
    if !hrids.needs_bootstrap(user_id, memory_type) {
        return Ok(());
    }
    let existing: Vec<(String, String)> = if graph.has_node_table(memory_type) {
        graph
            .query(
                &format!(
                    "SELECT hrid, id FROM \"{}\" WHERE user_id = :user AND hrid IS NOT NULL",
                    GraphStore::node_table_name(memory_type)
                ),
                &[(":user", Value::String(user_id.to_string()))],
            )?
            .into_iter()
            .filter_map(|row| {
                let hrid = row.get("hrid")?.as_str()?.to_string();
                let id = row.get("id")?.as_str()?.to_string();
                Some((hrid, id))
            })
            .collect()
    } else {
        Vec::new()
    };
    hrids.bootstrap(user_id, memory_type, existing);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedBowEmbedder;
    use serde_json::json;

    const REGISTRY: &str = r#"
entities:
  note:
    anchor: statement
    fields:
      statement: {type: string, required: true}
      details: {type: string}
      priority: {type: int}
"#;

    fn indexer() -> Indexer {
        let schema = Arc::new(SchemaRegistry::from_yaml_str(REGISTRY).unwrap());
        Indexer::new(
            schema,
            Arc::new(VectorStore::open_in_memory().unwrap()),
            Arc::new(GraphStore::open_in_memory().unwrap()),
            Arc::new(HashedBowEmbedder::new(16)),
            Arc::new(HridAllocator::new()),
            "memories",
            16,
        )
    }

    fn note_memory(statement: &str) -> Memory {
        let mut payload = HashMap::new();
        payload.insert("statement".to_string(), json!(statement));
        payload.insert("priority".to_string(), json!(2));
        Memory::new("note", payload, "u1")
    }

    #[test]
    fn test_index_writes_both_stores() {
        let indexer = indexer();
        let mut memory = note_memory("remember the milk");
        let id = indexer.index(&mut memory, None).unwrap();

        assert_eq!(id, memory.id);
        assert_eq!(memory.hrid.as_deref(), Some("NOTE_AAA000"));
        assert_eq!(memory.vector.as_ref().map(Vec::len), Some(16));

        let point = indexer.vector.get("memories", &id).unwrap().unwrap();
        assert_eq!(point.payload["hrid"], json!("NOTE_AAA000"));

        let node = indexer.graph.get_node("note", &id).unwrap().unwrap();
        assert_eq!(node["hrid"], json!("NOTE_AAA000"));
        assert_eq!(node["user_id"], json!("u1"));
        assert_eq!(node["priority"], json!(2));
        assert!(!node.contains_key("vector"));
    }

    #[test]
    fn test_empty_anchor_rejected() {
        let indexer = indexer();
        let mut payload = HashMap::new();
        payload.insert("statement".to_string(), json!("   "));
        let mut memory = Memory::new("note", payload, "u1");
        let err = indexer.index(&mut memory, None).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_override_wins_over_anchor() {
        let indexer = indexer();
        let mut memory = note_memory("anchor text");
        indexer.index(&mut memory, Some("override text")).unwrap();

        let expected = indexer.embedder.embed("override text").unwrap();
        assert_eq!(memory.vector.as_ref().unwrap(), &expected);
    }

    #[test]
    fn test_index_is_deterministic() {
        let indexer = indexer();
        let mut first = note_memory("same statement");
        let mut second = first.clone();
        second.id = first.id.clone();

        indexer.index(&mut first, None).unwrap();
        let props_first = indexer.node_properties(&first).unwrap();
        indexer.index(&mut second, None).unwrap();
        let props_second = indexer.node_properties(&second).unwrap();

        assert_eq!(first.vector, second.vector);
        // hrid differs per allocation; everything else matches
        let strip = |mut p: HashMap<String, Value>| {
            p.remove("hrid");
            p
        };
        assert_eq!(strip(props_first), strip(props_second));
    }

    #[test]
    fn test_wrong_dimension_embedder_rejected() {
        let schema = Arc::new(SchemaRegistry::from_yaml_str(REGISTRY).unwrap());
        let indexer = Indexer::new(
            schema,
            Arc::new(VectorStore::open_in_memory().unwrap()),
            Arc::new(GraphStore::open_in_memory().unwrap()),
            Arc::new(HashedBowEmbedder::new(8)),
            Arc::new(HridAllocator::new()),
            "memories",
            16,
        );
        let mut memory = note_memory("dimension mismatch");
        let err = indexer.index(&mut memory, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_hrid_seeding_after_restart() {
        let schema = Arc::new(SchemaRegistry::from_yaml_str(REGISTRY).unwrap());
        let graph = Arc::new(GraphStore::open_in_memory().unwrap());
        let vector = Arc::new(VectorStore::open_in_memory().unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(HashedBowEmbedder::new(16));

        let first = Indexer::new(
            schema.clone(),
            vector.clone(),
            graph.clone(),
            embedder.clone(),
            Arc::new(HridAllocator::new()),
            "memories",
            16,
        );
        let mut memory = note_memory("first");
        first.index(&mut memory, None).unwrap();

        // Fresh allocator simulates a restarted process over the same graph
        let second = Indexer::new(
            schema,
            vector,
            graph,
            embedder,
            Arc::new(HridAllocator::new()),
            "memories",
            16,
        );
        let mut another = note_memory("second");
        second.index(&mut another, None).unwrap();
        assert_eq!(another.hrid.as_deref(), Some("NOTE_AAA001"));
    }
}
