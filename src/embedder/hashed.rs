/// Deterministic feature-hashing embedder.
///
/// Each token is hashed into a bucket of the output vector with a signed
/// contribution, then the vector is L2-normalized. Texts sharing tokens
/// land near each other in cosine space, which is what the engine's
/// ranking and semantic-duplicate passes need; no model download or
/// inference runtime is involved.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

pub struct HashedEmbedder {
    pub dimensions: usize,
}

impl HashedEmbedder {
    /// Create a new `HashedEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

fn token_hash(token: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}

impl Embedder for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let h = token_hash(&token.to_lowercase());
            let bucket = (h % self.dimensions as u64) as usize;
            // High bit decides the sign so collisions tend to cancel
            // instead of compounding.
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // L2 normalize
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
