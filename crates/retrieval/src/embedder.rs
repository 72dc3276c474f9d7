//! Deterministic hashing embedder
//!
//! Feature-hashes words and character trigrams into a fixed-dimension
//! vector, L2-normalized. Not a semantic model; it is the default used by
//! tests and by assemblies that plug a real embedding service in later,
//! and it keeps cosine scores stable across runs.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use mnemon_config::constants::embedding as embedding_constants;
use mnemon_core::{EmbeddingProvider, Result};

pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        feature.hash(&mut hasher);
        (hasher.finish() % self.dimension as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(embedding_constants::DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered.split_whitespace() {
            vector[self.bucket(word)] += 1.0;

            let chars: Vec<char> = word.chars().collect();
            for trigram in chars.windows(3) {
                let trigram: String = trigram.iter().collect();
                vector[self.bucket(&trigram)] += 0.5;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
