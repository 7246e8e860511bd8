//! Error types for mnemon

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for mnemon operations
pub type Result<T> = std::result::Result<T, MnemonError>;

/// Main error type for mnemon
#[derive(Error, Debug)]
pub enum MnemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HRID space exhausted for user '{user_id}' type '{memory_type}'")]
    ResourceExhausted { user_id: String, memory_type: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Partial write: {side} store updated, the other failed (point {point_id}): {message}")]
    PartialWrite {
        /// Which store holds the orphaned write ("vector" or "graph").
        side: &'static str,
        point_id: String,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for MnemonError {
    fn from(e: rusqlite::Error) -> Self {
        MnemonError::Database(e.to_string())
    }
}

impl From<serde_yaml::Error> for MnemonError {
    fn from(e: serde_yaml::Error) -> Self {
        MnemonError::Schema(format!("invalid YAML: {e}"))
    }
}

impl MnemonError {
    /// Stable kind string surfaced on the API boundary
    pub fn kind(&self) -> &'static str {
        match self {
            MnemonError::Config(_) => "config",
            MnemonError::Schema(_) => "schema",
            MnemonError::Validation(_) => "validation",
            MnemonError::ResourceExhausted { .. } => "resource_exhausted",
            MnemonError::Database(_) => "database",
            MnemonError::PartialWrite { .. } => "partial_write",
            MnemonError::NotFound(_) => "not_found",
            MnemonError::InvalidInput(_) => "invalid_input",
            MnemonError::Serialization(_) => "serialization",
            MnemonError::Io(_) => "io",
        }
    }

    /// Wrap into a boundary envelope naming the failing operation
    pub fn envelope(&self, operation: &str) -> ErrorEnvelope {
        ErrorEnvelope {
            kind: self.kind().to_string(),
            message: self.to_string(),
            operation: operation.to_string(),
            context: BTreeMap::new(),
        }
    }
}

/// JSON-ish error envelope carried across the API boundary
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
    pub operation: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ErrorEnvelope {
    /// Attach a contextual key (user, type, hrid, ...)
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(MnemonError::Config("x".into()).kind(), "config");
        assert_eq!(
            MnemonError::PartialWrite {
                side: "vector",
                point_id: "p1".into(),
                message: "graph down".into(),
            }
            .kind(),
            "partial_write"
        );
    }

    #[test]
    fn test_envelope_context() {
        let env = MnemonError::NotFound("TASK_AAA001".into())
            .envelope("get_memory")
            .with("user_id", "u1")
            .with("hrid", "TASK_AAA001");
        assert_eq!(env.kind, "not_found");
        assert_eq!(env.operation, "get_memory");
        assert_eq!(env.context.get("user_id").unwrap(), "u1");
    }
}
