//! Graph store adapter
//!
//! A property graph over SQLite: one node table per entity type (created
//! lazily, columns inferred from the first values seen) and one edge table
//! per `(source_type, predicate, target_type)` triple under its canonical
//! name. A `graph_catalog` table records every created table so the
//! catalog survives restarts.
//!
//! Column typing is strict: a property arriving with a type that differs
//! from the declared column type is rejected, never silently coerced
//! (STRING and TIMESTAMP accept each other since both carry text).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{MnemonError, Result};
use crate::schema::edge_table_name;

/// Column types a node table can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    String,
    Int64,
    Double,
    Boolean,
    Timestamp,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "STRING",
            PropertyType::Int64 => "INT64",
            PropertyType::Double => "DOUBLE",
            PropertyType::Boolean => "BOOLEAN",
            PropertyType::Timestamp => "TIMESTAMP",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "STRING" => Some(PropertyType::String),
            "INT64" => Some(PropertyType::Int64),
            "DOUBLE" => Some(PropertyType::Double),
            "BOOLEAN" => Some(PropertyType::Boolean),
            "TIMESTAMP" => Some(PropertyType::Timestamp),
            _ => None,
        }
    }

    fn sql_type(&self) -> &'static str {
        match self {
            PropertyType::String | PropertyType::Timestamp => "TEXT",
            PropertyType::Int64 | PropertyType::Boolean => "INTEGER",
            PropertyType::Double => "REAL",
        }
    }

    /// Infer a column type from a value. Nulls carry no type.
    fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(PropertyType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(PropertyType::Int64),
            Value::Number(_) => Some(PropertyType::Double),
            Value::String(s) => {
                if DateTime::parse_from_rfc3339(s).is_ok() {
                    Some(PropertyType::Timestamp)
                } else {
                    Some(PropertyType::String)
                }
            }
            // Structured values must be serialized by the caller
            Value::Array(_) | Value::Object(_) => Some(PropertyType::String),
        }
    }

    /// Both directions of STRING/TIMESTAMP are text and accepted; every
    /// other mismatch is a refusal.
    fn accepts(&self, offered: PropertyType) -> bool {
        if *self == offered {
            return true;
        }
        matches!(
            (self, offered),
            (PropertyType::String, PropertyType::Timestamp)
                | (PropertyType::Timestamp, PropertyType::String)
        )
    }
}

/// One row from a neighbor fetch
#[derive(Debug, Clone)]
pub struct NeighborRow {
    pub properties: HashMap<String, Value>,
    pub relation_type: String,
}

/// Traversal direction for neighbor fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    In,
    Out,
    #[default]
    Any,
}

#[derive(Debug, Clone)]
struct EdgeTableInfo {
    table: String,
    source_type: String,
    predicate: String,
    target_type: String,
}

#[derive(Debug, Default)]
struct Catalog {
    /// entity type -> declared columns
    nodes: HashMap<String, HashMap<String, PropertyType>>,
    edges: Vec<EdgeTableInfo>,
}

/// SQLite-backed property graph
pub struct GraphStore {
    conn: Arc<Mutex<Connection>>,
    catalog: Mutex<Catalog>,
}

fn check_identifier(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MnemonError::Database(format!(
            "illegal graph identifier '{name}'"
        )));
    }
    Ok(())
}

fn node_table(entity_type: &str) -> String {
    format!("node_{}", entity_type.to_lowercase())
}

impl GraphStore {
    /// Open or create the backing database and reload the table catalog
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        };
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS graph_catalog (
                name TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                spec TEXT NOT NULL
            );
            "#,
        )?;

        let catalog = Self::load_catalog(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            catalog: Mutex::new(catalog),
        })
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn load_catalog(conn: &Connection) -> Result<Catalog> {
        let mut catalog = Catalog::default();
        let mut stmt = conn.prepare("SELECT name, kind, spec FROM graph_catalog ORDER BY name")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let spec: String = row.get(2)?;
            let spec: Value = serde_json::from_str(&spec)?;
            match kind.as_str() {
                "node" => {
                    let entity_type = spec["entity_type"].as_str().unwrap_or_default().to_string();
                    let columns = spec["columns"]
                        .as_object()
                        .map(|m| {
                            m.iter()
                                .filter_map(|(col, ty)| {
                                    ty.as_str()
                                        .and_then(PropertyType::parse)
                                        .map(|ty| (col.clone(), ty))
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    catalog.nodes.insert(entity_type, columns);
                }
                "edge" => {
                    catalog.edges.push(EdgeTableInfo {
                        table: name,
                        source_type: spec["source_type"].as_str().unwrap_or_default().to_string(),
                        predicate: spec["predicate"].as_str().unwrap_or_default().to_string(),
                        target_type: spec["target_type"].as_str().unwrap_or_default().to_string(),
                    });
                }
                other => {
                    warn!(kind = other, table = %name, "unknown catalog entry kind, skipping");
                }
            }
        }
        Ok(catalog)
    }

    fn persist_node_catalog(
        conn: &Connection,
        entity_type: &str,
        columns: &HashMap<String, PropertyType>,
    ) -> Result<()> {
        let columns_json: Value = columns
            .iter()
            .map(|(col, ty)| (col.clone(), Value::String(ty.as_str().to_string())))
            .collect::<serde_json::Map<String, Value>>()
            .into();
        let spec = serde_json::json!({"entity_type": entity_type, "columns": columns_json});
        conn.execute(
            "INSERT OR REPLACE INTO graph_catalog (name, kind, spec) VALUES (?1, 'node', ?2)",
            params![node_table(entity_type), spec.to_string()],
        )?;
        Ok(())
    }

    /// Create the node table for a type on first use and evolve its
    /// columns as new properties appear. Type conflicts are rejected.
    pub fn ensure_node_table(
        &self,
        entity_type: &str,
        properties: &HashMap<String, Value>,
    ) -> Result<()> {
        let entity_type = entity_type.to_lowercase();
        check_identifier(&entity_type)?;
        let mut catalog = self.catalog.lock();
        let conn = self.conn.lock();

        let incoming: Vec<(String, PropertyType)> = properties
            .iter()
            .filter(|(name, _)| *name != "id")
            .filter_map(|(name, value)| PropertyType::infer(value).map(|ty| (name.clone(), ty)))
            .collect();

        if let Some(columns) = catalog.nodes.get_mut(&entity_type) {
            let mut changed = false;
            for (name, offered) in incoming {
                check_identifier(&name)?;
                match columns.get(&name) {
                    Some(declared) if !declared.accepts(offered) => {
                        warn!(
                            entity_type = %entity_type,
                            column = %name,
                            declared = declared.as_str(),
                            offered = offered.as_str(),
                            "refusing column type change"
                        );
                        return Err(MnemonError::Database(format!(
                            "column '{}' of '{}' is {}, refusing value typed {}",
                            name,
                            entity_type,
                            declared.as_str(),
                            offered.as_str()
                        )));
                    }
                    Some(_) => {}
                    None => {
                        conn.execute(
                            &format!(
                                "ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}",
                                node_table(&entity_type),
                                name,
                                offered.sql_type()
                            ),
                            [],
                        )?;
                        columns.insert(name, offered);
                        changed = true;
                    }
                }
            }
            if changed {
                Self::persist_node_catalog(&conn, &entity_type, columns)?;
            }
            return Ok(());
        }

        let mut columns: HashMap<String, PropertyType> = HashMap::new();
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (id TEXT PRIMARY KEY",
            node_table(&entity_type)
        );
        for (name, ty) in incoming {
            check_identifier(&name)?;
            ddl.push_str(&format!(", \"{}\" {}", name, ty.sql_type()));
            columns.insert(name, ty);
        }
        ddl.push(')');
        conn.execute(&ddl, [])?;
        Self::persist_node_catalog(&conn, &entity_type, &columns)?;
        debug!(entity_type = %entity_type, "created node table");
        catalog.nodes.insert(entity_type, columns);
        Ok(())
    }

    /// Upsert a node by its `id` property
    pub fn add_node(&self, entity_type: &str, properties: &HashMap<String, Value>) -> Result<()> {
        let entity_type = entity_type.to_lowercase();
        let id = properties
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| MnemonError::InvalidInput("node properties must include 'id'".to_string()))?
            .to_string();
        self.ensure_node_table(&entity_type, properties)?;

        let catalog = self.catalog.lock();
        let conn = self.conn.lock();
        let columns = catalog.nodes.get(&entity_type).ok_or_else(|| {
            MnemonError::Database(format!("node table for '{entity_type}' is not registered"))
        })?;

        let mut names: Vec<&String> = columns.keys().collect();
        names.sort();

        let mut sql_columns = vec!["id".to_string()];
        let mut placeholders = vec!["?1".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id)];
        for name in names {
            sql_columns.push(format!("\"{name}\""));
            placeholders.push(format!("?{}", params.len() + 1));
            params.push(property_param(properties.get(name.as_str())));
        }

        let sql = format!(
            "INSERT OR REPLACE INTO \"{}\" ({}) VALUES ({})",
            node_table(&entity_type),
            sql_columns.join(", "),
            placeholders.join(", ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        conn.execute(&sql, param_refs.as_slice())?;
        Ok(())
    }

    /// Direct property update. System fields `{id, user_id, created_at}`
    /// are never touched.
    pub fn update_node(
        &self,
        entity_type: &str,
        id: &str,
        properties: &HashMap<String, Value>,
    ) -> Result<()> {
        let entity_type = entity_type.to_lowercase();
        let updatable: HashMap<String, Value> = properties
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "id" | "user_id" | "created_at"))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if updatable.is_empty() {
            return Ok(());
        }
        self.ensure_node_table(&entity_type, &updatable)?;

        let conn = self.conn.lock();
        let mut names: Vec<&String> = updatable.keys().collect();
        names.sort();

        let mut assignments: Vec<String> = Vec::with_capacity(names.len());
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(names.len() + 1);
        for name in names {
            assignments.push(format!("\"{}\" = ?{}", name, params.len() + 1));
            params.push(property_param(updatable.get(name.as_str())));
        }
        params.push(Box::new(id.to_string()));

        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE id = ?{}",
            node_table(&entity_type),
            assignments.join(", "),
            params.len()
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let updated = conn.execute(&sql, param_refs.as_slice())?;
        if updated == 0 {
            return Err(MnemonError::NotFound(format!(
                "node '{id}' of type '{entity_type}'"
            )));
        }
        Ok(())
    }

    /// Fetch one node's properties
    pub fn get_node(&self, entity_type: &str, id: &str) -> Result<Option<HashMap<String, Value>>> {
        let entity_type = entity_type.to_lowercase();
        {
            let catalog = self.catalog.lock();
            if !catalog.nodes.contains_key(&entity_type) {
                return Ok(None);
            }
        }
        let rows = self.query(
            &format!("SELECT * FROM \"{}\" WHERE id = :id", node_table(&entity_type)),
            &[(":id", Value::String(id.to_string()))],
        )?;
        Ok(rows.into_iter().next())
    }

    /// Idempotent creation of the edge table for a triple
    pub fn ensure_edge_table(
        &self,
        source_type: &str,
        predicate: &str,
        target_type: &str,
    ) -> Result<()> {
        let source_type = source_type.to_lowercase();
        let target_type = target_type.to_lowercase();
        let predicate = predicate.to_uppercase();
        check_identifier(&source_type)?;
        check_identifier(&target_type)?;
        check_identifier(&predicate)?;

        let table = edge_table_name(&source_type, &predicate, &target_type);
        let mut catalog = self.catalog.lock();
        if catalog.edges.iter().any(|edge| edge.table == table) {
            return Ok(());
        }

        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    from_id TEXT NOT NULL,
                    to_id TEXT NOT NULL,
                    props TEXT,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (from_id, to_id)
                )"
            ),
            [],
        )?;
        let spec = serde_json::json!({
            "source_type": source_type,
            "predicate": predicate,
            "target_type": target_type,
        });
        conn.execute(
            "INSERT OR REPLACE INTO graph_catalog (name, kind, spec) VALUES (?1, 'edge', ?2)",
            params![table, spec.to_string()],
        )?;
        debug!(table = %table, "created edge table");
        catalog.edges.push(EdgeTableInfo {
            table,
            source_type,
            predicate,
            target_type,
        });
        catalog.edges.sort_by(|a, b| a.table.cmp(&b.table));
        Ok(())
    }

    /// Add an edge. Duplicate edges are a no-op.
    pub fn add_edge(
        &self,
        source_type: &str,
        target_type: &str,
        predicate: &str,
        from_id: &str,
        to_id: &str,
        props: Option<&Value>,
    ) -> Result<()> {
        self.ensure_edge_table(source_type, predicate, target_type)?;
        let table = edge_table_name(
            &source_type.to_lowercase(),
            &predicate.to_uppercase(),
            &target_type.to_lowercase(),
        );
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO \"{table}\" (from_id, to_id, props, created_at) VALUES (?1, ?2, ?3, ?4)"
            ),
            params![
                from_id,
                to_id,
                props.map(|p| p.to_string()),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Remove an edge. Absence is a no-op.
    pub fn delete_edge(
        &self,
        source_type: &str,
        target_type: &str,
        predicate: &str,
        from_id: &str,
        to_id: &str,
    ) -> Result<()> {
        let table = edge_table_name(
            &source_type.to_lowercase(),
            &predicate.to_uppercase(),
            &target_type.to_lowercase(),
        );
        let exists = {
            let catalog = self.catalog.lock();
            catalog.edges.iter().any(|edge| edge.table == table)
        };
        if !exists {
            return Ok(());
        }
        let conn = self.conn.lock();
        conn.execute(
            &format!("DELETE FROM \"{table}\" WHERE from_id = ?1 AND to_id = ?2"),
            params![from_id, to_id],
        )?;
        Ok(())
    }

    /// Delete a node and every incident edge
    pub fn delete_node(&self, entity_type: &str, id: &str) -> Result<()> {
        let entity_type = entity_type.to_lowercase();
        let incident: Vec<(String, bool, bool)> = {
            let catalog = self.catalog.lock();
            if !catalog.nodes.contains_key(&entity_type) {
                return Ok(());
            }
            catalog
                .edges
                .iter()
                .filter(|edge| edge.source_type == entity_type || edge.target_type == entity_type)
                .map(|edge| {
                    (
                        edge.table.clone(),
                        edge.source_type == entity_type,
                        edge.target_type == entity_type,
                    )
                })
                .collect()
        };

        let conn = self.conn.lock();
        for (table, is_source, is_target) in incident {
            if is_source {
                conn.execute(&format!("DELETE FROM \"{table}\" WHERE from_id = ?1"), params![id])?;
            }
            if is_target {
                conn.execute(&format!("DELETE FROM \"{table}\" WHERE to_id = ?1"), params![id])?;
            }
        }
        conn.execute(
            &format!("DELETE FROM \"{}\" WHERE id = ?1", node_table(&entity_type)),
            params![id],
        )?;
        Ok(())
    }

    /// Execute a parametric query (named `:params`) and return plain rows
    pub fn query(&self, sql: &str, params: &[(&str, Value)]) -> Result<Vec<HashMap<String, Value>>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| MnemonError::Database(format!("query prepare failed: {e}")))?;

        let boxed: Vec<(&str, Box<dyn rusqlite::ToSql>)> = params
            .iter()
            .map(|(name, value)| {
                let param: Box<dyn rusqlite::ToSql> = match value {
                    Value::String(s) => Box::new(s.clone()),
                    Value::Bool(b) => Box::new(*b),
                    Value::Number(n) if n.is_i64() => Box::new(n.as_i64().unwrap_or_default()),
                    Value::Number(n) => Box::new(n.as_f64().unwrap_or_default()),
                    Value::Null => Box::new(None::<String>),
                    other => Box::new(other.to_string()),
                };
                (*name, param)
            })
            .collect();
        let named: Vec<(&str, &dyn rusqlite::ToSql)> = boxed
            .iter()
            .map(|(name, param)| (*name, param.as_ref()))
            .collect();

        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(named.as_slice())?;

        let mut out: Vec<HashMap<String, Value>> = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = HashMap::with_capacity(column_names.len());
            for (idx, name) in column_names.iter().enumerate() {
                map.insert(name.clone(), column_value(row.get_ref(idx)?));
            }
            out.push(map);
        }
        Ok(out)
    }

    /// Immediate neighbors of a node, filtered by predicate, direction,
    /// and optionally by neighbor type. Rows come back in edge-table order
    /// then neighbor id order, so runs are reproducible.
    pub fn neighbors(
        &self,
        node_type: &str,
        node_id: &str,
        predicates: Option<&[String]>,
        direction: Direction,
        limit: usize,
        neighbor_type: Option<&str>,
    ) -> Result<Vec<NeighborRow>> {
        let node_type = node_type.to_lowercase();
        let neighbor_type = neighbor_type.map(str::to_lowercase);
        let plans: Vec<(String, String, String, bool)> = {
            let catalog = self.catalog.lock();
            let wanted = |predicate: &str| {
                predicates
                    .map(|list| list.iter().any(|p| p.eq_ignore_ascii_case(predicate)))
                    .unwrap_or(true)
            };
            let mut plans = Vec::new();
            for edge in &catalog.edges {
                if !wanted(&edge.predicate) {
                    continue;
                }
                // Outgoing side
                if matches!(direction, Direction::Out | Direction::Any)
                    && edge.source_type == node_type
                    && neighbor_type
                        .as_deref()
                        .map(|t| t == edge.target_type)
                        .unwrap_or(true)
                {
                    plans.push((
                        edge.table.clone(),
                        edge.target_type.clone(),
                        edge.predicate.clone(),
                        true,
                    ));
                }
                // Incoming side
                if matches!(direction, Direction::In | Direction::Any)
                    && edge.target_type == node_type
                    && neighbor_type
                        .as_deref()
                        .map(|t| t == edge.source_type)
                        .unwrap_or(true)
                {
                    plans.push((
                        edge.table.clone(),
                        edge.source_type.clone(),
                        edge.predicate.clone(),
                        false,
                    ));
                }
            }
            plans
        };

        let mut out: Vec<NeighborRow> = Vec::new();
        for (table, neighbor_entity, predicate, outgoing) in plans {
            if out.len() >= limit {
                break;
            }
            let (join_col, match_col) = if outgoing {
                ("to_id", "from_id")
            } else {
                ("from_id", "to_id")
            };
            let sql = format!(
                "SELECT n.* FROM \"{}\" n JOIN \"{}\" e ON n.id = e.{} WHERE e.{} = :id ORDER BY n.id LIMIT :limit",
                node_table(&neighbor_entity),
                table,
                join_col,
                match_col
            );
            let remaining = (limit - out.len()) as i64;
            let rows = self.query(
                &sql,
                &[
                    (":id", Value::String(node_id.to_string())),
                    (":limit", Value::from(remaining)),
                ],
            )?;
            for properties in rows {
                out.push(NeighborRow {
                    properties,
                    relation_type: predicate.clone(),
                });
            }
        }
        Ok(out)
    }

    /// Entity types with a node table
    pub fn node_types(&self) -> Vec<String> {
        let catalog = self.catalog.lock();
        let mut types: Vec<String> = catalog.nodes.keys().cloned().collect();
        types.sort();
        types
    }

    /// Count nodes of one type
    pub fn count_nodes(&self, entity_type: &str) -> Result<i64> {
        let entity_type = entity_type.to_lowercase();
        {
            let catalog = self.catalog.lock();
            if !catalog.nodes.contains_key(&entity_type) {
                return Ok(0);
            }
        }
        let conn = self.conn.lock();
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", node_table(&entity_type)),
            [],
            |row| row.get(0),
        )?)
    }

    /// True once a node table exists for the type
    pub fn has_node_table(&self, entity_type: &str) -> bool {
        let catalog = self.catalog.lock();
        catalog.nodes.contains_key(&entity_type.to_lowercase())
    }

    /// SQL name of the node table for a type (for assembled queries)
    pub fn node_table_name(entity_type: &str) -> String {
        node_table(entity_type)
    }

    /// Round-trip latency of a trivial query, for health checks
    pub fn ping(&self) -> Result<f64> {
        let start = std::time::Instant::now();
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

fn property_param(value: Option<&Value>) -> Box<dyn rusqlite::ToSql> {
    match value {
        None | Some(Value::Null) => Box::new(None::<String>),
        Some(Value::String(s)) => Box::new(s.clone()),
        Some(Value::Bool(b)) => Box::new(*b),
        Some(Value::Number(n)) if n.is_i64() => Box::new(n.as_i64().unwrap_or_default()),
        Some(Value::Number(n)) => Box::new(n.as_f64().unwrap_or_default()),
        Some(other) => Box::new(other.to_string()),
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}
