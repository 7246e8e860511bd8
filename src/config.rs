//! Environment-driven configuration

use serde::{Deserialize, Serialize};

use crate::error::{MnemonError, Result};

/// Runtime settings, loaded from `MNEMON_*` environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Location of the schema registry file
    pub schema_path: String,
    /// Backing storage root for the vector store (`:memory:` for tests)
    pub vector_storage_path: String,
    /// Backing storage root for the graph store (`:memory:` for tests)
    pub graph_storage_path: String,
    /// Embedding model identifier ("hashed-bow" is the built-in)
    pub embedder_model: String,
    /// Dimension every embedding must match
    pub vector_dimension: usize,
    /// Logical vector collection name
    pub collection_name: String,
    /// Minimum similarity for a vector hit to count
    pub similarity_threshold: f32,
    /// Minimum final score for a result to be returned
    pub score_threshold: f32,
    /// Similarity above which two records are considered near-identical
    pub high_similarity_threshold: f32,
    /// Bulk-operation chunking hint
    pub batch_processing_size: usize,
    pub debug_mode: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_path: "schema.yaml".to_string(),
            vector_storage_path: ":memory:".to_string(),
            graph_storage_path: ":memory:".to_string(),
            embedder_model: "hashed-bow".to_string(),
            vector_dimension: 384,
            collection_name: "memories".to_string(),
            similarity_threshold: 0.3,
            score_threshold: 0.0,
            high_similarity_threshold: 0.9,
            batch_processing_size: 100,
            debug_mode: false,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();

        if let Ok(v) = std::env::var("MNEMON_SCHEMA_PATH") {
            settings.schema_path = v;
        }
        if let Ok(v) = std::env::var("MNEMON_VECTOR_STORAGE_PATH") {
            settings.vector_storage_path = v;
        }
        if let Ok(v) = std::env::var("MNEMON_GRAPH_STORAGE_PATH") {
            settings.graph_storage_path = v;
        }
        if let Ok(v) = std::env::var("MNEMON_EMBEDDER_MODEL") {
            settings.embedder_model = v;
        }
        if let Ok(v) = std::env::var("MNEMON_VECTOR_DIMENSION") {
            settings.vector_dimension = parse_env("MNEMON_VECTOR_DIMENSION", &v)?;
        }
        if let Ok(v) = std::env::var("MNEMON_COLLECTION_NAME") {
            settings.collection_name = v;
        }
        if let Ok(v) = std::env::var("MNEMON_SIMILARITY_THRESHOLD") {
            settings.similarity_threshold = parse_env("MNEMON_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Ok(v) = std::env::var("MNEMON_SCORE_THRESHOLD") {
            settings.score_threshold = parse_env("MNEMON_SCORE_THRESHOLD", &v)?;
        }
        if let Ok(v) = std::env::var("MNEMON_HIGH_SIMILARITY_THRESHOLD") {
            settings.high_similarity_threshold = parse_env("MNEMON_HIGH_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Ok(v) = std::env::var("MNEMON_BATCH_PROCESSING_SIZE") {
            settings.batch_processing_size = parse_env("MNEMON_BATCH_PROCESSING_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("MNEMON_DEBUG_MODE") {
            settings.debug_mode = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("MNEMON_LOG_LEVEL") {
            settings.log_level = v;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Check ranges that must hold regardless of where values came from
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("MNEMON_SIMILARITY_THRESHOLD", self.similarity_threshold),
            ("MNEMON_SCORE_THRESHOLD", self.score_threshold),
            ("MNEMON_HIGH_SIMILARITY_THRESHOLD", self.high_similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MnemonError::Config(format!(
                    "{name} must be within 0..=1, got {value}"
                )));
            }
        }
        if self.vector_dimension == 0 {
            return Err(MnemonError::Config(
                "MNEMON_VECTOR_DIMENSION must be positive".to_string(),
            ));
        }
        if self.batch_processing_size == 0 {
            return Err(MnemonError::Config(
                "MNEMON_BATCH_PROCESSING_SIZE must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| MnemonError::Config(format!("{name} has invalid value '{raw}'")))
}
