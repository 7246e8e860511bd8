//! Core types for mnemon

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A memory record. Core fields only; everything entity-specific lives in
/// `payload` and is validated against the schema registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque internal identifier. Doubles as the vector point id and the
    /// graph node id.
    pub id: String,
    /// Human-readable id (`TYPE_AAA000`), unique per (user, type).
    pub hrid: Option<String>,
    /// Tenant scope; every operation filters by it.
    pub user_id: String,
    /// Entity type name from the schema registry (lowercased).
    #[serde(rename = "type")]
    pub memory_type: String,
    /// Entity-specific fields, schema-validated.
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Embedding vector (present after indexing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last updated
    pub updated_at: DateTime<Utc>,
    /// Tombstone flag reserved for lineage
    #[serde(default = "default_true")]
    pub is_valid: bool,
    /// ID of the memory this supersedes (reserved for lineage)
    #[serde(default)]
    pub supersedes: Option<String>,
    /// ID of the memory superseding this one (reserved for lineage)
    #[serde(default)]
    pub superseded_by: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Memory {
    /// Create a new unindexed memory with a fresh internal id
    pub fn new(memory_type: impl Into<String>, payload: HashMap<String, Value>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            hrid: None,
            user_id: user_id.into(),
            memory_type: memory_type.into(),
            payload,
            tags: Vec::new(),
            vector: None,
            created_at: now,
            updated_at: now,
            is_valid: true,
            supersedes: None,
            superseded_by: None,
        }
    }

    /// Read a validated payload field. Unknown fields are `None`; there is
    /// no attribute-style fallback onto core fields.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Build the vector point payload: core fields flattened plus the
    /// entity payload under `payload`. Datetimes serialize as RFC 3339.
    pub fn to_point_payload(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "hrid": self.hrid,
            "user_id": self.user_id,
            "memory_type": self.memory_type,
            "tags": self.tags,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
            "is_valid": self.is_valid,
            "supersedes": self.supersedes,
            "superseded_by": self.superseded_by,
            "payload": self.payload,
        })
    }

    /// Rebuild a memory from a vector point payload
    pub fn from_point_payload(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let parse_ts = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };
        let entity: HashMap<String, Value> = obj
            .get("payload")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Some(Self {
            id: obj.get("id")?.as_str()?.to_string(),
            hrid: obj.get("hrid").and_then(Value::as_str).map(String::from),
            user_id: obj.get("user_id").and_then(Value::as_str).unwrap_or_default().to_string(),
            memory_type: obj.get("memory_type").and_then(Value::as_str).unwrap_or_default().to_string(),
            payload: entity,
            tags: obj
                .get("tags")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            vector: None,
            created_at: parse_ts("created_at").unwrap_or_else(Utc::now),
            updated_at: parse_ts("updated_at").unwrap_or_else(Utc::now),
            is_valid: obj.get("is_valid").and_then(Value::as_bool).unwrap_or(true),
            supersedes: obj.get("supersedes").and_then(Value::as_str).map(String::from),
            superseded_by: obj.get("superseded_by").and_then(Value::as_str).map(String::from),
        })
    }
}

/// How a search result was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSource {
    Vector,
    Graph,
    Hybrid,
    /// Appended by neighbor expansion over the named predicate
    Neighbor(String),
}

impl ResultSource {
    pub fn as_str(&self) -> String {
        match self {
            ResultSource::Vector => "vector".to_string(),
            ResultSource::Graph => "graph".to_string(),
            ResultSource::Hybrid => "hybrid".to_string(),
            ResultSource::Neighbor(rel) => format!("neighbor:{rel}"),
        }
    }
}

impl std::fmt::Display for ResultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ResultSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "vector" => ResultSource::Vector,
            "graph" => ResultSource::Graph,
            "hybrid" => ResultSource::Hybrid,
            other => match other.strip_prefix("neighbor:") {
                Some(rel) => ResultSource::Neighbor(rel.to_string()),
                None => return Err(serde::de::Error::custom(format!("unknown result source: {other}"))),
            },
        })
    }
}

/// Search result with provenance metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched memory
    pub memory: Memory,
    /// Relevance score in [0, 1]
    pub score: f32,
    /// Raw vector distance when the vector store produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    /// Which path produced the result
    pub source: ResultSource,
    /// Free-form metadata (e.g. `relation_type`, `seed_id`)
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Retrieval mode for the unified pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Graph,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Vector => "vector",
            SearchMode::Graph => "graph",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vector" => Ok(SearchMode::Vector),
            "graph" => Ok(SearchMode::Graph),
            "hybrid" => Ok(SearchMode::Hybrid),
            _ => Err(format!("Unknown search mode: {s}")),
        }
    }
}

/// Payload projection level for search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetailLevel {
    /// Anchor text and core identifiers only
    #[default]
    #[serde(rename = "none")]
    AnchorOnly,
    /// Anchor plus fields permitted by the per-type projection allow-list
    #[serde(rename = "self")]
    SelfFields,
}

impl std::str::FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(DetailLevel::AnchorOnly),
            "self" => Ok(DetailLevel::SelfFields),
            _ => Err(format!("Unknown detail level: {s}")),
        }
    }
}

/// Parameters for the unified search pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query; embedded for the vector path
    pub query: Option<String>,
    /// Maximum results
    pub limit: Option<usize>,
    /// Extra payload filters applied on the vector path
    #[serde(default)]
    pub filters: Vec<crate::store::filter::FilterCond>,
    /// Restrict to one entity type
    #[serde(default, rename = "memo_type")]
    pub memory_type: Option<String>,
    /// Only records with `updated_at >= now - N days`
    pub modified_within_days: Option<i64>,
    /// Force a retrieval mode instead of auto-selection
    pub mode: Option<SearchMode>,
    /// Predicates eligible for neighbor expansion (default: full catalog)
    pub relation_names: Option<Vec<String>>,
    /// How many top results seed neighbor expansion
    pub neighbor_cap: Option<usize>,
    /// Payload projection level
    #[serde(default)]
    pub include_details: DetailLevel,
    /// Per-type field allow-list used when `include_details = self`
    #[serde(default)]
    pub projection: HashMap<String, Vec<String>>,
}

/// Parameters for listing memories (graph path, filterable, paginated)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    /// Restrict to one entity type
    #[serde(default, rename = "memo_type")]
    pub memory_type: Option<String>,
    /// Extra payload filters
    #[serde(default)]
    pub filters: Vec<crate::store::filter::FilterCond>,
    /// Only records with `updated_at >= now - N days`
    pub modified_within_days: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Expand immediate neighbors of listed records
    #[serde(default)]
    pub expand_neighbors: bool,
}
