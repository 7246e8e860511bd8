//! Unified retrieval pipeline
//!
//! Mode selection, filter assembly, optional vector rerank of graph
//! candidates, neighbor expansion over the relation catalog, payload
//! projection, and a total result ordering that is reproducible across
//! runs for identical inputs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::warn;

use crate::embedding::Embedder;
use crate::error::{MnemonError, Result};
use crate::hrid::hrid_to_index;
use crate::pipeline::indexer::NODE_CORE_FIELDS;
use crate::schema::SchemaRegistry;
use crate::store::{Direction, FilterCond, GraphStore, VectorStore};
use crate::types::{DetailLevel, Memory, ResultSource, SearchMode, SearchRequest, SearchResult};

/// Score multiplier a neighbor inherits from its seed
pub const NEIGHBOR_DECAY: f32 = 0.9;
/// Lowest score an appended neighbor can carry
pub const NEIGHBOR_FLOOR: f32 = 0.3;
/// Mid score for graph candidates the vector store knows nothing about
const RERANK_DEFAULT_SCORE: f32 = 0.5;

const DEFAULT_LIMIT: usize = 20;
pub(crate) const DEFAULT_NEIGHBOR_CAP: usize = 5;

/// Unified search over both stores
pub struct RetrievalPipeline {
    schema: Arc<SchemaRegistry>,
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    /// Minimum cosine similarity for a direct vector hit to count
    similarity_threshold: f32,
    /// Minimum final score for a result to be returned
    score_threshold: f32,
}

impl RetrievalPipeline {
    pub fn new(
        schema: Arc<SchemaRegistry>,
        vector: Arc<VectorStore>,
        graph: Arc<GraphStore>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        similarity_threshold: f32,
        score_threshold: f32,
    ) -> Self {
        Self {
            schema,
            vector,
            graph,
            embedder,
            collection: collection.into(),
            similarity_threshold,
            score_threshold,
        }
    }

    /// Run a search request for one user
    pub fn search(&self, request: &SearchRequest, user_id: &str) -> Result<Vec<SearchResult>> {
        if user_id.trim().is_empty() {
            return Err(MnemonError::Validation("user_id is required".to_string()));
        }
        let query = request.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);

        let mode = match request.mode {
            Some(mode) => mode,
            None if query.is_some() => SearchMode::Vector,
            None if request.memory_type.is_some() || request.modified_within_days.is_some() => {
                SearchMode::Graph
            }
            None => {
                return Err(MnemonError::Validation(
                    "Provide a query, a memo_type, or modified_within_days".to_string(),
                ))
            }
        };

        if let Some(memory_type) = &request.memory_type {
            // Unknown types fail early with the known-type listing
            self.schema.entity(memory_type)?;
        }

        let mut results = match mode {
            SearchMode::Vector => self.vector_path(query, user_id, limit, request)?,
            SearchMode::Graph => match self.graph_path(query, user_id, limit, request) {
                Ok(results) => results,
                // A graph outage is never user-visible: degrade to the
                // vector path, or to no results when there is nothing
                // to embed
                Err(e @ MnemonError::Database(_)) => {
                    warn!(error = %e, "graph path failed, falling back to vector search");
                    match query {
                        Some(_) => self.vector_path(query, user_id, limit, request)?,
                        None => Vec::new(),
                    }
                }
                Err(e) => return Err(e),
            },
            SearchMode::Hybrid => {
                let vector_results = if query.is_some() {
                    self.vector_path(query, user_id, limit, request)?
                } else {
                    Vec::new()
                };
                match self.graph_path(query, user_id, limit, request) {
                    Ok(graph_results) => merge_by_id(vector_results, graph_results),
                    Err(e @ MnemonError::Database(_)) => {
                        warn!(error = %e, "graph path failed, keeping vector results only");
                        vector_results
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        results.retain(|result| result.score >= self.score_threshold);
        sort_results(&mut results);

        let neighbor_cap = request.neighbor_cap.unwrap_or(DEFAULT_NEIGHBOR_CAP);
        if neighbor_cap > 0 && !results.is_empty() {
            let predicates = request
                .relation_names
                .clone()
                .unwrap_or_else(|| self.schema.relation_names());
            if !predicates.is_empty() {
                if let Err(e) = self.append_neighbors(&mut results, user_id, &predicates, neighbor_cap) {
                    // Neighbor expansion is additive; a graph outage must
                    // not fail an otherwise answerable search
                    match e {
                        MnemonError::Database(_) => {
                            warn!(error = %e, "neighbor expansion skipped")
                        }
                        other => return Err(other),
                    }
                }
            }
        }

        self.apply_projection(&mut results, request.include_details, &request.projection);
        sort_results(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    /// Vector path: filter conjunction + cosine search
    fn vector_path(
        &self,
        query: Option<&str>,
        user_id: &str,
        limit: usize,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>> {
        let query = query.ok_or_else(|| {
            MnemonError::Validation("vector search requires a query".to_string())
        })?;

        let mut filters: Vec<FilterCond> = Vec::new();
        if let Some(memory_type) = &request.memory_type {
            filters.push(FilterCond::eq("memory_type", memory_type.to_lowercase()));
        }
        if let Some(days) = request.modified_within_days {
            filters.push(FilterCond::gte("updated_at", cutoff_rfc3339(days)?));
        }
        filters.extend(request.filters.iter().cloned());

        let query_vector = self.embedder.embed(query)?;
        let hits = self
            .vector
            .search(&self.collection, &query_vector, limit, Some(user_id), &filters)?;

        Ok(hits
            .into_iter()
            .filter(|hit| hit.score >= self.similarity_threshold)
            .filter_map(|hit| {
                let memory = Memory::from_point_payload(&hit.payload)?;
                let score = hit.score.clamp(0.0, 1.0);
                Some(SearchResult {
                    memory,
                    score,
                    distance: Some(1.0 - hit.score),
                    source: ResultSource::Vector,
                    metadata: HashMap::new(),
                })
            })
            .collect())
    }

    /// Graph path: parametric candidate query, then an optional vector
    /// rerank restricted to the candidate ids.
    fn graph_path(
        &self,
        query: Option<&str>,
        user_id: &str,
        limit: usize,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self.graph_candidates(
            user_id,
            request.memory_type.as_deref(),
            &[],
            request.modified_within_days,
            limit,
            0,
        )?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        match query {
            Some(query) => {
                let query_vector = self.embedder.embed(query)?;
                let ids: Vec<Value> = candidates
                    .iter()
                    .map(|memory| Value::String(memory.id.clone()))
                    .collect();
                let hits = self.vector.search(
                    &self.collection,
                    &query_vector,
                    ids.len(),
                    Some(user_id),
                    &[FilterCond::any_of("id", ids)],
                )?;
                let score_by_id: HashMap<String, f32> =
                    hits.into_iter().map(|hit| (hit.id, hit.score)).collect();

                Ok(candidates
                    .into_iter()
                    .map(|memory| {
                        let score = score_by_id
                            .get(&memory.id)
                            .copied()
                            .unwrap_or(RERANK_DEFAULT_SCORE)
                            .clamp(0.0, 1.0);
                        SearchResult {
                            memory,
                            score,
                            distance: None,
                            source: ResultSource::Graph,
                            metadata: HashMap::new(),
                        }
                    })
                    .collect())
            }
            None => Ok(candidates
                .into_iter()
                .map(|memory| SearchResult {
                    memory,
                    score: 1.0,
                    distance: None,
                    source: ResultSource::Graph,
                    metadata: HashMap::new(),
                })
                .collect()),
        }
    }

    /// Assemble and run the parametric node query for the graph path and
    /// for listing. Candidates come back newest-first, then id order.
    pub fn graph_candidates(
        &self,
        user_id: &str,
        memory_type: Option<&str>,
        filters: &[FilterCond],
        modified_within_days: Option<i64>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Memory>> {
        let types: Vec<String> = match memory_type {
            Some(memory_type) => vec![self.schema.entity(memory_type)?.name.clone()],
            None => self.schema.entity_names(),
        };
        let cutoff = modified_within_days.map(cutoff_rfc3339).transpose()?;
        let (filter_sql, filter_params) = compile_node_filters(filters)?;

        let mut memories: Vec<Memory> = Vec::new();
        for entity_type in types {
            if !self.graph.has_node_table(&entity_type) {
                continue;
            }
            let mut sql = format!(
                "SELECT * FROM \"{}\" WHERE user_id = :user",
                GraphStore::node_table_name(&entity_type)
            );
            let mut params: Vec<(&str, Value)> =
                vec![(":user", Value::String(user_id.to_string()))];
            if let Some(cutoff) = &cutoff {
                sql.push_str(" AND updated_at >= :cutoff");
                params.push((":cutoff", Value::String(cutoff.clone())));
            }
            if !filter_sql.is_empty() {
                sql.push_str(&filter_sql);
            }
            for (name, value) in &filter_params {
                params.push((name.as_str(), value.clone()));
            }
            sql.push_str(" ORDER BY updated_at DESC, id ASC LIMIT :limit");
            params.push((":limit", Value::from((limit + offset) as i64)));

            for row in self.graph.query(&sql, &params)? {
                if let Some(memory) = memory_from_node(&row) {
                    memories.push(memory);
                }
            }
        }

        memories.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(memories.into_iter().skip(offset).take(limit).collect())
    }

    /// Fetch immediate neighbors of the top results and merge them in.
    /// A neighbor inherits `seed_score * NEIGHBOR_DECAY`, floored at
    /// NEIGHBOR_FLOOR; an id already present keeps its maximum score.
    pub fn append_neighbors(
        &self,
        results: &mut Vec<SearchResult>,
        user_id: &str,
        predicates: &[String],
        neighbor_cap: usize,
    ) -> Result<()> {
        let undirected: Vec<String> = predicates
            .iter()
            .filter(|p| !self.schema.relation_directed(p))
            .cloned()
            .collect();

        let seeds: Vec<(String, String, f32)> = results
            .iter()
            .take(neighbor_cap)
            .map(|result| {
                (
                    result.memory.memory_type.clone(),
                    result.memory.id.clone(),
                    result.score,
                )
            })
            .collect();

        let mut appended: Vec<SearchResult> = Vec::new();
        for (seed_type, seed_id, seed_score) in seeds {
            let mut rows = self.graph.neighbors(
                &seed_type,
                &seed_id,
                Some(predicates),
                Direction::Out,
                neighbor_cap,
                None,
            )?;
            if !undirected.is_empty() {
                rows.extend(self.graph.neighbors(
                    &seed_type,
                    &seed_id,
                    Some(&undirected),
                    Direction::In,
                    neighbor_cap,
                    None,
                )?);
            }

            for row in rows {
                let Some(memory) = memory_from_node(&row.properties) else {
                    continue;
                };
                if memory.user_id != user_id {
                    continue;
                }
                let score = (seed_score * NEIGHBOR_DECAY).max(NEIGHBOR_FLOOR).clamp(0.0, 1.0);
                let mut metadata = HashMap::new();
                metadata.insert(
                    "relation_type".to_string(),
                    Value::String(row.relation_type.clone()),
                );
                metadata.insert("seed".to_string(), Value::String(seed_id.clone()));
                appended.push(SearchResult {
                    memory,
                    score,
                    distance: None,
                    source: ResultSource::Neighbor(row.relation_type),
                    metadata,
                });
            }
        }

        for neighbor in appended {
            match results
                .iter_mut()
                .find(|existing| existing.memory.id == neighbor.memory.id)
            {
                Some(existing) => {
                    if neighbor.score > existing.score {
                        *existing = neighbor;
                    }
                }
                None => results.push(neighbor),
            }
        }
        Ok(())
    }

    /// Reduce result payloads to the requested detail level
    fn apply_projection(
        &self,
        results: &mut [SearchResult],
        include_details: DetailLevel,
        projection: &HashMap<String, Vec<String>>,
    ) {
        for result in results.iter_mut() {
            let memory = &mut result.memory;
            let Ok(anchor_field) = self.schema.anchor_field(&memory.memory_type) else {
                continue;
            };
            let anchor_field = anchor_field.to_string();

            let mut projected: HashMap<String, Value> = HashMap::new();
            if let Some(anchor_value) = memory.payload.get(&anchor_field) {
                projected.insert(anchor_field.clone(), anchor_value.clone());
            }
            if include_details == DetailLevel::SelfFields {
                if let Some(allowed) = projection.get(&memory.memory_type) {
                    for field in allowed {
                        if field == &anchor_field {
                            continue;
                        }
                        if let Some(value) = memory.payload.get(field) {
                            projected.insert(field.clone(), value.clone());
                        }
                    }
                }
            }
            memory.payload = projected;
            memory.vector = None;
        }
    }
}

/// Merge two result sets by memory id, keeping the higher score. A record
/// found by both paths is tagged hybrid.
fn merge_by_id(left: Vec<SearchResult>, right: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = left;
    for candidate in right {
        match merged
            .iter_mut()
            .find(|existing| existing.memory.id == candidate.memory.id)
        {
            Some(existing) => {
                if candidate.score > existing.score {
                    existing.score = candidate.score;
                    existing.distance = candidate.distance;
                }
                existing.source = ResultSource::Hybrid;
            }
            None => merged.push(candidate),
        }
    }
    merged
}

/// Total result ordering: score desc, HRID index asc, id asc
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| hrid_sort_key(&a.memory).cmp(&hrid_sort_key(&b.memory)))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}

fn hrid_sort_key(memory: &Memory) -> u64 {
    memory
        .hrid
        .as_deref()
        .and_then(|hrid| hrid_to_index(hrid).ok())
        .unwrap_or(u64::MAX)
}

fn cutoff_rfc3339(days: i64) -> Result<String> {
    if days < 0 {
        return Err(MnemonError::InvalidInput(format!(
            "modified_within_days must be non-negative, got {days}"
        )));
    }
    Ok((Utc::now() - Duration::days(days)).to_rfc3339())
}

/// Compile payload filters into SQL clauses over node columns. Returns
/// `(" AND col ...", named params)` with generated parameter names.
fn compile_node_filters(filters: &[FilterCond]) -> Result<(String, Vec<(String, Value)>)> {
    let mut sql = String::new();
    let mut params: Vec<(String, Value)> = Vec::new();
    let check = |field: &str| -> Result<()> {
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MnemonError::InvalidInput(format!(
                "Unsupported filter field '{field}'"
            )));
        }
        Ok(())
    };

    for cond in filters {
        match cond {
            FilterCond::Eq { field, value } => {
                check(field)?;
                let name = format!(":f{}", params.len());
                sql.push_str(&format!(" AND \"{field}\" = {name}"));
                params.push((name, value.clone()));
            }
            FilterCond::AnyOf { field, values } => {
                check(field)?;
                if values.is_empty() {
                    sql.push_str(" AND 1=0");
                    continue;
                }
                let mut names: Vec<String> = Vec::with_capacity(values.len());
                for value in values {
                    let name = format!(":f{}", params.len());
                    names.push(name.clone());
                    params.push((name, value.clone()));
                }
                sql.push_str(&format!(" AND \"{field}\" IN ({})", names.join(", ")));
            }
            FilterCond::Range { field, gt, gte, lt, lte } => {
                check(field)?;
                let mut any_bound = false;
                for (op, bound) in [(">", gt), (">=", gte), ("<", lt), ("<=", lte)] {
                    if let Some(value) = bound {
                        let name = format!(":f{}", params.len());
                        sql.push_str(&format!(" AND \"{field}\" {op} {name}"));
                        params.push((name, value.clone()));
                        any_bound = true;
                    }
                }
                if !any_bound {
                    return Err(MnemonError::InvalidInput(format!(
                        "Range filter on '{field}' has no bounds"
                    )));
                }
            }
        }
    }
    Ok((sql, params))
}

/// Rebuild a memory from graph node properties. Non-primitive payload
/// fields are not stored on nodes, so the payload here is the projection.
pub fn memory_from_node(props: &HashMap<String, Value>) -> Option<Memory> {
    let id = props.get("id")?.as_str()?.to_string();
    let parse_ts = |key: &str| {
        props
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    };
    let as_opt_string = |key: &str| {
        props
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    let payload: HashMap<String, Value> = props
        .iter()
        .filter(|(name, value)| {
            !NODE_CORE_FIELDS.contains(&name.as_str()) && !value.is_null()
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    Some(Memory {
        id,
        hrid: as_opt_string("hrid"),
        user_id: props
            .get("user_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        memory_type: props
            .get("memory_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        payload,
        tags: props
            .get("tags")
            .and_then(Value::as_str)
            .map(|joined| {
                joined
                    .split(',')
                    .filter(|tag| !tag.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        vector: None,
        created_at: parse_ts("created_at").unwrap_or_else(Utc::now),
        updated_at: parse_ts("updated_at").unwrap_or_else(Utc::now),
        is_valid: match props.get("is_valid") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(1) != 0,
            _ => true,
        },
        supersedes: as_opt_string("supersedes"),
        superseded_by: as_opt_string("superseded_by"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str, hrid: &str, score: f32) -> SearchResult {
        let mut memory = Memory::new("note", HashMap::new(), "u1");
        memory.id = id.to_string();
        memory.hrid = Some(hrid.to_string());
        SearchResult {
            memory,
            score,
            distance: None,
            source: ResultSource::Vector,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_sort_by_score_then_hrid_then_id() {
        let mut results = vec![
            result("c", "TASK_AAA001", 0.5),
            result("a", "NOTE_AAA000", 0.5),
            result("b", "NOTE_AAA001", 0.9),
        ];
        sort_results(&mut results);
        let ids: Vec<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();
        // Highest score first; ties ordered by hrid index
        assert_eq!(ids[0], "b");
        let first_tie = hrid_to_index("NOTE_AAA000").unwrap();
        let second_tie = hrid_to_index("TASK_AAA001").unwrap();
        if first_tie < second_tie {
            assert_eq!(ids[1..], ["a", "c"]);
        } else {
            assert_eq!(ids[1..], ["c", "a"]);
        }
    }

    #[test]
    fn test_merge_by_id_keeps_max_and_tags_hybrid() {
        let left = vec![result("x", "NOTE_AAA000", 0.4)];
        let mut right = vec![result("x", "NOTE_AAA000", 0.7), result("y", "NOTE_AAA001", 0.2)];
        right[0].source = ResultSource::Graph;
        right[1].source = ResultSource::Graph;

        let merged = merge_by_id(left, right);
        assert_eq!(merged.len(), 2);
        let x = merged.iter().find(|r| r.memory.id == "x").unwrap();
        assert!((x.score - 0.7).abs() < 1e-6);
        assert_eq!(x.source, ResultSource::Hybrid);
    }

    #[test]
    fn test_memory_from_node_round_trip() {
        let props: HashMap<String, Value> = [
            ("id", json!("m1")),
            ("hrid", json!("TASK_AAA000")),
            ("user_id", json!("u1")),
            ("memory_type", json!("task")),
            ("tags", json!("a,b")),
            ("created_at", json!("2026-08-01T00:00:00+00:00")),
            ("updated_at", json!("2026-08-02T00:00:00+00:00")),
            ("is_valid", json!(1)),
            ("statement", json!("do the thing")),
            ("status", json!("todo")),
            ("supersedes", json!(null)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let memory = memory_from_node(&props).unwrap();
        assert_eq!(memory.hrid.as_deref(), Some("TASK_AAA000"));
        assert_eq!(memory.tags, vec!["a", "b"]);
        assert!(memory.is_valid);
        assert!(memory.supersedes.is_none());
        assert_eq!(memory.get("statement"), Some(&json!("do the thing")));
        assert_eq!(memory.get("status"), Some(&json!("todo")));
        assert!(memory.get("user_id").is_none());
    }

    #[test]
    fn test_negative_cutoff_rejected() {
        assert!(cutoff_rfc3339(-1).is_err());
    }

    #[test]
    fn test_compile_node_filters() {
        let (sql, params) = compile_node_filters(&[
            FilterCond::eq("status", "todo"),
            FilterCond::any_of("priority", vec![json!(1), json!(2)]),
        ])
        .unwrap();
        assert!(sql.contains("\"status\" = :f0"));
        assert!(sql.contains("\"priority\" IN (:f1, :f2)"));
        assert_eq!(params.len(), 3);
    }
}
