use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{AuthorityCandidate, Neighbor, SubjectField, VocabularyCode};

/// Converts text into fixed-length vectors.
///
/// Implementations must fail with `Error::EmbeddingUnavailable` rather than
/// hand back empty or all-zero vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `fake:d1024`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(Error::EmbeddingUnavailable(format!(
                "expected one vector, provider returned {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

/// Read-only nearest-neighbor access to indexed vocabularies, one partition
/// per vocabulary code.
#[async_trait]
pub trait VocabularyStore: Send + Sync {
    /// Up to `k` entries of `vocabulary` closest to `query`, best first.
    /// A vocabulary with nothing indexed yields an empty list.
    async fn nearest_neighbors(
        &self,
        vocabulary: &VocabularyCode,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>>;

    /// Number of entries indexed for `vocabulary`.
    async fn count(&self, vocabulary: &VocabularyCode) -> Result<usize>;
}

/// Produces a short human-readable justification for a built field.
#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(
        &self,
        topic: &str,
        candidate: &AuthorityCandidate,
        field: &SubjectField,
    ) -> Result<String>;
}

/// Check a provider's output before it is used for search or storage.
pub fn ensure_usable_vector(vector: &[f32], dim: usize) -> Result<()> {
    if vector.len() != dim {
        return Err(Error::EmbeddingUnavailable(format!(
            "vector has {} dimensions, expected {dim}",
            vector.len()
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(Error::EmbeddingUnavailable("vector contains non-finite values".into()));
    }
    if vector.iter().all(|x| *x == 0.0) {
        return Err(Error::EmbeddingUnavailable("provider returned a zero vector".into()));
    }
    Ok(())
}

/// Cosine similarity of two vectors; 0.0 when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_misshapen_vectors_are_rejected() {
        assert!(ensure_usable_vector(&[0.0, 0.0], 2).is_err());
        assert!(ensure_usable_vector(&[1.0], 2).is_err());
        assert!(ensure_usable_vector(&[f32::NAN, 1.0], 2).is_err());
        assert!(ensure_usable_vector(&[0.6, 0.8], 2).is_ok());
    }

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let s = cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((s - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
