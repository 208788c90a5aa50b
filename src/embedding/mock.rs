//! Offline embedder for tests and local runs.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::EmbeddingError;

/// Deterministic bag-of-words embedder.
///
/// Each lowercased alphanumeric token is hashed into one of `dims` buckets
/// with a signed weight, and the result is scaled to unit length. Texts that
/// share words therefore score higher than texts that do not, which is
/// enough for exercising ranking without a model. A text with no tokens
/// maps to the zero vector.
pub struct MockEmbedder {
    dims: usize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// Synchronous core of [`Embedder::embed`].
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x = (*x / norm).clamp(-1.0, 1.0);
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector_for(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[test]
    fn deterministic_and_in_range() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.vector_for("Refund policy for damaged items");
        let b = embedder.vector_for("Refund policy for damaged items");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn shared_words_score_higher() {
        let embedder = MockEmbedder::new(64);
        let query = embedder.vector_for("refund policy");
        let related = embedder.vector_for("Our refund policy allows returns within 30 days.");
        let unrelated = embedder.vector_for("The warehouse ships on weekdays only.");
        let related_score = cosine_similarity(&query, &related).unwrap();
        let unrelated_score = cosine_similarity(&query, &unrelated).unwrap_or(0.0);
        assert!(related_score > unrelated_score);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = MockEmbedder::new(4);
        assert_eq!(embedder.vector_for("  ... "), vec![0.0; 4]);
    }

    #[tokio::test]
    async fn embed_matches_vector_for() {
        let embedder = MockEmbedder::new(8);
        assert_eq!(embedder.embed("hello world").await.unwrap(), embedder.vector_for("hello world"));
    }
}
