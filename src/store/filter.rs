//! Payload filter conditions for vector search
//!
//! A search filter is a conjunction of conditions over point payload
//! fields: exact match, any-of list match, and numeric/datetime ranges.
//! Conditions compile to SQL over the JSON payload column.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MnemonError, Result};

/// Core payload fields stored at the top level of the point payload;
/// everything else lives under `payload.<field>`.
const CORE_FIELDS: &[&str] = &[
    "id",
    "hrid",
    "user_id",
    "memory_type",
    "created_at",
    "updated_at",
    "is_valid",
];

/// One condition in a filter conjunction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FilterCond {
    /// Exact match on a field
    Eq { field: String, value: Value },
    /// Field equals any of the listed values
    AnyOf { field: String, values: Vec<Value> },
    /// Open/closed range over numbers or RFC 3339 datetimes
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gt: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lt: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<Value>,
    },
}

impl FilterCond {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterCond::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterCond::AnyOf {
            field: field.into(),
            values,
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterCond::Range {
            field: field.into(),
            gt: None,
            gte: Some(value.into()),
            lt: None,
            lte: None,
        }
    }

    fn field(&self) -> &str {
        match self {
            FilterCond::Eq { field, .. }
            | FilterCond::AnyOf { field, .. }
            | FilterCond::Range { field, .. } => field,
        }
    }
}

/// JSON path of a filter field within the point payload
fn json_path(field: &str) -> Result<String> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MnemonError::InvalidInput(format!(
            "Unsupported filter field '{field}'"
        )));
    }
    if CORE_FIELDS.contains(&field) {
        Ok(format!("$.{field}"))
    } else {
        Ok(format!("$.payload.{field}"))
    }
}

fn value_param(value: &Value) -> Result<Box<dyn rusqlite::ToSql>> {
    match value {
        Value::String(s) => Ok(Box::new(s.clone())),
        Value::Bool(b) => Ok(Box::new(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Box::new(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Box::new(f))
            } else {
                Err(MnemonError::InvalidInput(format!(
                    "Unsupported filter number: {n}"
                )))
            }
        }
        other => Err(MnemonError::InvalidInput(format!(
            "Unsupported filter value: {other}"
        ))),
    }
}

/// Compile a conjunction into a SQL predicate over `payload` plus its
/// positional parameters. Empty input compiles to a tautology.
pub fn compile_filters(
    conditions: &[FilterCond],
) -> Result<(String, Vec<Box<dyn rusqlite::ToSql>>)> {
    if conditions.is_empty() {
        return Ok(("1=1".to_string(), Vec::new()));
    }

    let mut clauses: Vec<String> = Vec::with_capacity(conditions.len());
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    for cond in conditions {
        let path = json_path(cond.field())?;
        match cond {
            FilterCond::Eq { value, .. } => {
                clauses.push(format!("json_extract(payload, '{path}') = ?"));
                params.push(value_param(value)?);
            }
            FilterCond::AnyOf { values, .. } => {
                if values.is_empty() {
                    // An empty disjunction matches nothing
                    clauses.push("1=0".to_string());
                    continue;
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!(
                    "json_extract(payload, '{path}') IN ({placeholders})"
                ));
                for value in values {
                    params.push(value_param(value)?);
                }
            }
            FilterCond::Range { gt, gte, lt, lte, .. } => {
                let mut any_bound = false;
                for (op, bound) in [(">", gt), (">=", gte), ("<", lt), ("<=", lte)] {
                    if let Some(value) = bound {
                        clauses.push(format!("json_extract(payload, '{path}') {op} ?"));
                        params.push(value_param(value)?);
                        any_bound = true;
                    }
                }
                if !any_bound {
                    return Err(MnemonError::InvalidInput(format!(
                        "Range filter on '{}' has no bounds",
                        cond.field()
                    )));
                }
            }
        }
    }

    Ok((clauses.join(" AND "), params))
}
