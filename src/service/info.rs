//! System info and health surface

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::schema::{FieldsSpec, SchemaRegistry};
use crate::store::{GraphStore, VectorStore};

/// Health of one backing store
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub healthy: bool,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entity type as surfaced to callers
#[derive(Debug, Clone, Serialize)]
pub struct EntitySurface {
    pub name: String,
    pub anchor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<String>,
}

/// One relation as surfaced to callers
#[derive(Debug, Clone, Serialize)]
pub struct RelationSurface {
    pub predicates: Vec<String>,
    pub directed: bool,
}

/// The active schema, flattened for display
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSurface {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub entities: Vec<EntitySurface>,
    pub relations: Vec<RelationSurface>,
}

/// Snapshot of schema, store status, and counts
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub schema: SchemaSurface,
    pub vector_store: StoreHealth,
    pub graph_store: StoreHealth,
    /// Graph node counts per entity type
    pub node_counts: HashMap<String, i64>,
    /// Total points in the vector collection
    pub point_count: i64,
}

fn probe(result: crate::error::Result<f64>) -> StoreHealth {
    match result {
        Ok(latency_ms) => StoreHealth {
            healthy: true,
            latency_ms,
            error: None,
        },
        Err(e) => StoreHealth {
            healthy: false,
            latency_ms: 0.0,
            error: Some(e.to_string()),
        },
    }
}

/// Gather the info snapshot. Count failures degrade to zero rather than
/// failing the whole surface.
pub fn collect(
    schema: &Arc<SchemaRegistry>,
    vector: &Arc<VectorStore>,
    graph: &Arc<GraphStore>,
    collection: &str,
) -> SystemInfo {
    let entities = schema
        .entities()
        .iter()
        .map(|(name, spec)| EntitySurface {
            name: name.clone(),
            anchor: spec.anchor.clone(),
            description: spec.description.clone(),
            fields: match &spec.fields {
                FieldsSpec::Flat(map) => map.keys().cloned().collect(),
                FieldsSpec::Split { required, optional } => {
                    let mut fields = required.clone();
                    fields.extend(optional.clone());
                    fields
                }
            },
        })
        .collect();
    let relations = schema
        .relations()
        .iter()
        .map(|relation| RelationSurface {
            predicates: relation.predicates.clone(),
            directed: relation.directed,
        })
        .collect();

    let node_counts: HashMap<String, i64> = schema
        .entity_names()
        .into_iter()
        .map(|name| {
            let count = graph.count_nodes(&name).unwrap_or(0);
            (name, count)
        })
        .collect();
    let point_count = vector.count(collection).unwrap_or(0);

    SystemInfo {
        schema: SchemaSurface {
            version: schema.version().map(String::from),
            entities,
            relations,
        },
        vector_store: probe(vector.ping()),
        graph_store: probe(graph.ping()),
        node_counts,
        point_count,
    }
}
