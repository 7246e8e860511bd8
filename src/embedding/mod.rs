//! Embedding generation
//!
//! The core only needs one contract: `text -> dense vector of fixed
//! dimension`. The built-in [`HashedBowEmbedder`] is deterministic and
//! corpus-free, which keeps indexing a pure function of its inputs; real
//! model backends plug in behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{MnemonError, Result};

/// Trait for embedding generators
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embedding dimension
    fn dimensions(&self) -> usize;

    /// Model name
    fn model_name(&self) -> &str;
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over a byte string. Stable across platforms and runs, unlike
/// the std hasher.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Contribution of an adjacent-token pair relative to a single term
const PAIR_WEIGHT: f32 = 0.25;

/// Deterministic hashed bag-of-words embedder.
///
/// Every term folds into two signed slots of the output vector: a full-
/// weight slot from the low hash bits and a half-weight slot from the
/// high bits, with signs drawn from the hash itself. Term weight is
/// sqrt(tf) damped by log token length (longer tokens carry more
/// signal). Adjacent-token pairs fold in at [`PAIR_WEIGHT`] under a
/// combined hash. The result is L2-normalized.
pub struct HashedBowEmbedder {
    dimensions: usize,
}

impl HashedBowEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Lowercase alphanumeric runs
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|run| !run.is_empty())
            .map(String::from)
            .collect()
    }

    /// Spread one hashed feature over its two slots
    fn fold(&self, hash: u64, weight: f32, out: &mut [f32]) {
        let dim = self.dimensions as u64;
        let primary = (hash % dim) as usize;
        let secondary = ((hash >> 32) % dim) as usize;
        let primary_sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
        let secondary_sign = if hash & 2 == 0 { 1.0 } else { -1.0 };
        out[primary] += weight * primary_sign;
        out[secondary] += 0.5 * weight * secondary_sign;
    }
}

impl Embedder for HashedBowEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut embedding = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(embedding);
        }

        let mut counts: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        for (token, count) in counts {
            let weight = count.sqrt() * (2.0 + token.len() as f32).ln();
            self.fold(fnv1a(token.as_bytes()), weight, &mut embedding);
        }

        for pair in tokens.windows(2) {
            let joint = fnv1a(pair[0].as_bytes()).rotate_left(17) ^ fnv1a(pair[1].as_bytes());
            self.fold(joint, PAIR_WEIGHT, &mut embedding);
        }

        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashed-bow"
    }
}

/// Create an embedder from configuration
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match settings.embedder_model.as_str() {
        "hashed-bow" => Ok(Arc::new(HashedBowEmbedder::new(settings.vector_dimension))),
        other => Err(MnemonError::Config(format!(
            "Unknown embedder model: {other}"
        ))),
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);
    }

    #[test]
    fn test_fnv1a_is_stable() {
        // Known FNV-1a test vector
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_embed_deterministic() {
        let embedder = HashedBowEmbedder::new(128);
        let e1 = embedder.embed("postgres docker setup").unwrap();
        let e2 = embedder.embed("postgres docker setup").unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_embed_similarity_ranking() {
        let embedder = HashedBowEmbedder::new(384);
        let base = embedder.embed("set up postgres with docker").unwrap();
        let close = embedder.embed("postgres docker").unwrap();
        let far = embedder.embed("quarterly revenue forecast").unwrap();
        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_shared_terms_score_well() {
        let embedder = HashedBowEmbedder::new(384);
        let memory = embedder.embed("Set up Postgres with Docker").unwrap();
        let query = embedder.embed("postgres docker").unwrap();
        assert!(cosine_similarity(&memory, &query) >= 0.3);
    }

    #[test]
    fn test_embed_empty_is_zero() {
        let embedder = HashedBowEmbedder::new(64);
        let e = embedder.embed("").unwrap();
        assert_eq!(e.len(), 64);
        assert!(e.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_embed_normalized() {
        let embedder = HashedBowEmbedder::new(384);
        let e = embedder.embed("a handful of words to embed").unwrap();
        let norm: f32 = e.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }
}
