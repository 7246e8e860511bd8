//! Memory service façade
//!
//! Composes the schema registry, HRID allocator, both store adapters, and
//! the pipelines into the public operations. Every operation takes a
//! `user_id`; every mutation serializes through one writer lock. Errors
//! are logged structured (operation, duration, kind) and re-raised.

pub mod info;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::Settings;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{MnemonError, Result};
use crate::hrid::{hrid_type, HridAllocator};
use crate::pipeline::indexer::seed_hrid_space;
use crate::pipeline::retrieval::{memory_from_node, DEFAULT_NEIGHBOR_CAP};
use crate::pipeline::{Indexer, RetrievalPipeline};
use crate::schema::SchemaRegistry;
use crate::store::{GraphStore, VectorStore};
use crate::types::{ListRequest, Memory, ResultSource, SearchRequest, SearchResult};

pub use info::{SchemaSurface, StoreHealth, SystemInfo};

/// Schema-driven memory service over a vector store and a property graph
pub struct MemoryService {
    schema: Arc<SchemaRegistry>,
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    hrids: Arc<HridAllocator>,
    indexer: Indexer,
    retrieval: RetrievalPipeline,
    collection: String,
    /// Single-writer discipline: every mutation goes through this lock
    writer: Mutex<()>,
}

impl MemoryService {
    /// Wire a service from injected collaborators
    pub fn new(
        settings: &Settings,
        schema: Arc<SchemaRegistry>,
        vector: Arc<VectorStore>,
        graph: Arc<GraphStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        settings.validate()?;
        if embedder.dimensions() != settings.vector_dimension {
            return Err(MnemonError::Config(format!(
                "embedder dimension {} does not match configured {}",
                embedder.dimensions(),
                settings.vector_dimension
            )));
        }
        let hrids = Arc::new(HridAllocator::new());
        let indexer = Indexer::new(
            schema.clone(),
            vector.clone(),
            graph.clone(),
            embedder.clone(),
            hrids.clone(),
            settings.collection_name.clone(),
            settings.vector_dimension,
        );
        let retrieval = RetrievalPipeline::new(
            schema.clone(),
            vector.clone(),
            graph.clone(),
            embedder,
            settings.collection_name.clone(),
            settings.similarity_threshold,
            settings.score_threshold,
        );
        vector.ensure_collection(&settings.collection_name, settings.vector_dimension)?;
        Ok(Self {
            schema,
            vector,
            graph,
            hrids,
            indexer,
            retrieval,
            collection: settings.collection_name.clone(),
            writer: Mutex::new(()),
        })
    }

    /// Open a service from settings: load the registry, open both stores,
    /// and build the configured embedder.
    pub fn open(settings: &Settings) -> Result<Self> {
        let schema = Arc::new(SchemaRegistry::load(&settings.schema_path)?);
        let vector = Arc::new(VectorStore::open(&settings.vector_storage_path)?);
        let graph = Arc::new(GraphStore::open(&settings.graph_storage_path)?);
        let embedder = create_embedder(settings)?;
        Self::new(settings, schema, vector, graph, embedder)
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    fn instrument<T>(&self, operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        match f() {
            Ok(value) => {
                debug!(
                    operation,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "operation ok"
                );
                Ok(value)
            }
            Err(e) => {
                error!(
                    operation,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    kind = e.kind(),
                    error = %e,
                    "operation failed"
                );
                Err(e)
            }
        }
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Validate, allocate an HRID, and index a new memory
    pub fn add(
        &self,
        memory_type: &str,
        payload: HashMap<String, Value>,
        user_id: &str,
        tags: Option<Vec<String>>,
    ) -> Result<Memory> {
        self.instrument("add_memory", || {
            if user_id.trim().is_empty() {
                return Err(MnemonError::Validation("user_id is required".to_string()));
            }
            if payload.is_empty() {
                return Err(MnemonError::Validation("payload cannot be empty".to_string()));
            }
            let spec = self.schema.entity(memory_type)?;
            let entity_type = spec.name.clone();
            let cleaned = self.schema.validate_payload(&entity_type, &payload)?;

            let mut memory = Memory::new(entity_type, cleaned, user_id);
            if let Some(tags) = tags {
                let mut tags: Vec<String> = tags
                    .into_iter()
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect();
                tags.sort();
                tags.dedup();
                memory.tags = tags;
            }

            let _writer = self.writer.lock();
            self.indexer.index(&mut memory, None)?;
            Ok(memory)
        })
    }

    /// Note shim: anchor = `statement`
    pub fn add_note(
        &self,
        text: &str,
        user_id: &str,
        title: Option<&str>,
        tags: Option<Vec<String>>,
    ) -> Result<Memory> {
        if text.trim().is_empty() {
            return Err(MnemonError::Validation("note content cannot be empty".to_string()));
        }
        let mut payload = HashMap::new();
        payload.insert("statement".to_string(), Value::String(text.trim().to_string()));
        if let Some(title) = title {
            payload.insert("title".to_string(), Value::String(title.to_string()));
        }
        self.add("note", payload, user_id, tags)
    }

    /// Document shim: `statement` is the summary (or truncated body),
    /// `details` carries the full text.
    pub fn add_document(
        &self,
        text: &str,
        user_id: &str,
        title: Option<&str>,
        summary: Option<&str>,
        tags: Option<Vec<String>>,
    ) -> Result<Memory> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MnemonError::Validation("document content cannot be empty".to_string()));
        }
        let statement = match summary.map(str::trim).filter(|s| !s.is_empty()) {
            Some(summary) => summary.to_string(),
            None if text.chars().count() > 200 => {
                let truncated: String = text.chars().take(200).collect();
                format!("{truncated}...")
            }
            None => text.to_string(),
        };
        let mut payload = HashMap::new();
        payload.insert("statement".to_string(), Value::String(statement));
        payload.insert("details".to_string(), Value::String(text.to_string()));
        if let Some(title) = title {
            payload.insert("title".to_string(), Value::String(title.to_string()));
        }
        self.add("document", payload, user_id, tags)
    }

    /// Task shim: anchor = `statement` plus an optional lifecycle status
    pub fn add_task(
        &self,
        text: &str,
        user_id: &str,
        status: Option<&str>,
        tags: Option<Vec<String>>,
    ) -> Result<Memory> {
        if text.trim().is_empty() {
            return Err(MnemonError::Validation("task content cannot be empty".to_string()));
        }
        let mut payload = HashMap::new();
        payload.insert("statement".to_string(), Value::String(text.trim().to_string()));
        if let Some(status) = status {
            payload.insert("status".to_string(), Value::String(status.to_string()));
        }
        self.add("task", payload, user_id, tags)
    }

    // ========================================================================
    // Read
    // ========================================================================

    fn resolve(&self, hrid: &str, user_id: &str) -> Result<(String, String)> {
        let entity_type = hrid_type(hrid)?;
        self.schema.entity(&entity_type)?;
        seed_hrid_space(&self.hrids, &self.graph, user_id, &entity_type)?;
        let id = self
            .hrids
            .resolve(hrid, user_id)
            .ok_or_else(|| MnemonError::NotFound(format!("{} for user '{}'", hrid.trim().to_uppercase(), user_id)))?;
        Ok((entity_type, id))
    }

    /// Fetch one memory by HRID. The graph is the primary read; the vector
    /// payload fills the non-primitive fields (and stands in alone when
    /// the graph is unreachable).
    pub fn get(&self, hrid: &str, user_id: &str) -> Result<Memory> {
        self.instrument("get_memory", || {
            let (entity_type, id) = self.resolve(hrid, user_id)?;

            let from_graph = match self.graph.get_node(&entity_type, &id) {
                Ok(node) => node.as_ref().and_then(memory_from_node),
                Err(e) => {
                    warn!(error = %e, "graph read failed, serving from vector payload");
                    None
                }
            };
            let from_vector = self
                .vector
                .get(&self.collection, &id)?
                .and_then(|point| Memory::from_point_payload(&point.payload));

            let memory = match (from_graph, from_vector) {
                (Some(mut graph_memory), Some(vector_memory)) => {
                    // Non-primitive payload fields live only on the point
                    for (field, value) in vector_memory.payload {
                        graph_memory.payload.entry(field).or_insert(value);
                    }
                    graph_memory
                }
                (Some(graph_memory), None) => graph_memory,
                (None, Some(vector_memory)) => vector_memory,
                (None, None) => {
                    return Err(MnemonError::NotFound(format!(
                        "{} for user '{}'",
                        hrid.trim().to_uppercase(),
                        user_id
                    )))
                }
            };
            if memory.user_id != user_id {
                return Err(MnemonError::NotFound(format!(
                    "{} for user '{}'",
                    hrid.trim().to_uppercase(),
                    user_id
                )));
            }
            Ok(memory)
        })
    }

    /// Unified search (see the retrieval pipeline for mode selection)
    pub fn search(&self, request: &SearchRequest, user_id: &str) -> Result<Vec<SearchResult>> {
        self.instrument("search_memories", || self.retrieval.search(request, user_id))
    }

    /// List memories via the graph path, newest first, with optional
    /// neighbor expansion.
    pub fn list(&self, request: &ListRequest, user_id: &str) -> Result<Vec<SearchResult>> {
        self.instrument("list_memories", || {
            if user_id.trim().is_empty() {
                return Err(MnemonError::Validation("user_id is required".to_string()));
            }
            let limit = request.limit.unwrap_or(50);
            let candidates = self.retrieval.graph_candidates(
                user_id,
                request.memory_type.as_deref(),
                &request.filters,
                request.modified_within_days,
                limit,
                request.offset.unwrap_or(0),
            )?;
            let mut results: Vec<SearchResult> = candidates
                .into_iter()
                .map(|memory| SearchResult {
                    memory,
                    score: 1.0,
                    distance: None,
                    source: ResultSource::Graph,
                    metadata: HashMap::new(),
                })
                .collect();
            if request.expand_neighbors && !results.is_empty() {
                let predicates = self.schema.relation_names();
                if !predicates.is_empty() {
                    self.retrieval.append_neighbors(
                        &mut results,
                        user_id,
                        &predicates,
                        DEFAULT_NEIGHBOR_CAP,
                    )?;
                }
            }
            Ok(results)
        })
    }

    // ========================================================================
    // Update / delete
    // ========================================================================

    /// Patch-merge a memory's payload. Identity is preserved: `id`,
    /// `hrid`, and `created_at` never change; `updated_at` advances. The
    /// anchor is re-embedded only when its text actually changed.
    pub fn update(
        &self,
        hrid: &str,
        patch: HashMap<String, Value>,
        user_id: &str,
    ) -> Result<Memory> {
        self.instrument("update_memory", || {
            if patch.is_empty() {
                return Err(MnemonError::InvalidInput("empty patch".to_string()));
            }
            let current = self.get(hrid, user_id)?;
            let (entity_type, id) = self.resolve(hrid, user_id)?;

            // Merge: patch wins; null removes a field
            let mut merged = current.payload.clone();
            for (field, value) in patch {
                if value.is_null() {
                    merged.remove(&field);
                } else {
                    merged.insert(field, value);
                }
            }
            let cleaned = self.schema.validate_payload(&entity_type, &merged)?;

            let mut updated = current.clone();
            updated.payload = cleaned;
            updated.updated_at = Utc::now();

            let old_anchor = self.schema.anchor_text(&current)?;
            let new_anchor = self.schema.anchor_text(&updated)?;

            let _writer = self.writer.lock();
            let vector = if new_anchor != old_anchor {
                let vector = self.indexer.embed_anchor(&new_anchor)?;
                updated.vector = Some(vector.clone());
                vector
            } else {
                match self.vector.get(&self.collection, &id)? {
                    Some(point) => point.vector,
                    None => self.indexer.embed_anchor(&new_anchor)?,
                }
            };
            self.vector
                .upsert(&self.collection, &id, &vector, &updated.to_point_payload())?;

            let node_props = self.indexer.node_properties(&updated)?;
            self.graph.update_node(&entity_type, &id, &node_props)?;
            Ok(updated)
        })
    }

    /// Delete a memory: node and incident edges first, then the vector
    /// point, then the HRID mapping. Idempotent.
    pub fn delete(&self, hrid: &str, user_id: &str) -> Result<()> {
        self.instrument("delete_memory", || {
            let entity_type = hrid_type(hrid)?;
            seed_hrid_space(&self.hrids, &self.graph, user_id, &entity_type)?;
            let Some(id) = self.hrids.resolve(hrid, user_id) else {
                // Already gone
                return Ok(());
            };

            let _writer = self.writer.lock();
            self.graph.delete_node(&entity_type, &id)?;
            self.vector.delete(&self.collection, &[id])?;
            self.hrids.forget(hrid, user_id);
            Ok(())
        })
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    fn relationship_ends(
        &self,
        from_hrid: &str,
        to_hrid: &str,
        predicate: &str,
        from_type: Option<&str>,
        to_type: Option<&str>,
        user_id: &str,
    ) -> Result<(String, String, String, String, String)> {
        let from_type = match from_type {
            Some(t) => self.schema.entity(t)?.name.clone(),
            None => hrid_type(from_hrid)?,
        };
        let to_type = match to_type {
            Some(t) => self.schema.entity(t)?.name.clone(),
            None => hrid_type(to_hrid)?,
        };
        let predicate = predicate.to_uppercase();
        if !self.schema.relation_allowed(&from_type, &predicate, &to_type) {
            return Err(MnemonError::Schema(format!(
                "relation ({from_type})-[{predicate}]->({to_type}) is not declared; known predicates: {}",
                self.schema.relation_names().join(", ")
            )));
        }
        let (_, from_id) = self.resolve(from_hrid, user_id)?;
        let (_, to_id) = self.resolve(to_hrid, user_id)?;

        // Both ends must be live nodes owned by the caller
        for (entity_type, id, hrid) in
            [(&from_type, &from_id, from_hrid), (&to_type, &to_id, to_hrid)]
        {
            let node = self
                .graph
                .get_node(entity_type, id)?
                .ok_or_else(|| MnemonError::NotFound(format!("{} for user '{}'", hrid, user_id)))?;
            let owner = node.get("user_id").and_then(Value::as_str).unwrap_or_default();
            if owner != user_id {
                return Err(MnemonError::Validation(format!(
                    "{hrid} does not belong to user '{user_id}'"
                )));
            }
        }
        Ok((from_type, to_type, predicate, from_id, to_id))
    }

    /// Add a typed edge between two memories. Duplicates are a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn add_relationship(
        &self,
        from_hrid: &str,
        to_hrid: &str,
        predicate: &str,
        from_type: Option<&str>,
        to_type: Option<&str>,
        user_id: &str,
    ) -> Result<()> {
        self.instrument("add_relationship", || {
            let (from_type, to_type, predicate, from_id, to_id) = self.relationship_ends(
                from_hrid, to_hrid, predicate, from_type, to_type, user_id,
            )?;
            let _writer = self.writer.lock();
            self.graph
                .add_edge(&from_type, &to_type, &predicate, &from_id, &to_id, None)
        })
    }

    /// Remove a typed edge. Absence is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn delete_relationship(
        &self,
        from_hrid: &str,
        to_hrid: &str,
        predicate: &str,
        from_type: Option<&str>,
        to_type: Option<&str>,
        user_id: &str,
    ) -> Result<()> {
        self.instrument("delete_relationship", || {
            let (from_type, to_type, predicate, from_id, to_id) = self.relationship_ends(
                from_hrid, to_hrid, predicate, from_type, to_type, user_id,
            )?;
            let _writer = self.writer.lock();
            self.graph
                .delete_edge(&from_type, &to_type, &predicate, &from_id, &to_id)
        })
    }

    // ========================================================================
    // System info
    // ========================================================================

    /// Schema surface, store health, and per-type counts
    pub fn system_info(&self) -> SystemInfo {
        info::collect(&self.schema, &self.vector, &self.graph, &self.collection)
    }
}
