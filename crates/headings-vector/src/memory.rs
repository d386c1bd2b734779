use async_trait::async_trait;
use std::collections::HashMap;

use headings_core::traits::{cosine_similarity, ensure_usable_vector, Embedder, VocabularyStore};
use headings_core::{Neighbor, Result, VocabularyCode, VocabularyEntry};

/// Brute-force cosine store held in memory. Suitable for small vocabularies,
/// tests, and tools that never touch disk.
#[derive(Debug, Default)]
pub struct MemoryVocabularyStore {
    partitions: HashMap<VocabularyCode, Vec<VocabularyEntry>>,
}

impl MemoryVocabularyStore {
    /// Entries must already carry embeddings; later duplicates replace earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = VocabularyEntry>) -> Result<Self> {
        let mut store = Self::default();
        for entry in entries {
            ensure_usable_vector(&entry.embedding, entry.embedding.len().max(1))?;
            let partition = store.partitions.entry(entry.vocabulary_code.clone()).or_default();
            match partition.iter_mut().find(|e| e.identifier == entry.identifier) {
                Some(existing) => *existing = entry,
                None => partition.push(entry),
            }
        }
        Ok(store)
    }

    /// Embed `entries` with `embedder` and load them.
    pub async fn build(embedder: &dyn Embedder, mut entries: Vec<VocabularyEntry>) -> Result<Self> {
        let texts: Vec<String> = entries.iter().map(VocabularyEntry::embedding_text).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        for (entry, vector) in entries.iter_mut().zip(vectors) {
            ensure_usable_vector(&vector, embedder.dim())?;
            entry.embedding = vector;
        }
        Self::from_entries(entries)
    }
}

#[async_trait]
impl VocabularyStore for MemoryVocabularyStore {
    async fn nearest_neighbors(&self, vocabulary: &VocabularyCode, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let Some(partition) = self.partitions.get(vocabulary) else { return Ok(vec![]) };
        let mut scored: Vec<(f32, &VocabularyEntry)> =
            partition.iter().map(|e| (cosine_similarity(query, &e.embedding), e)).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(similarity, e)| Neighbor {
                identifier: e.identifier.clone(),
                label: e.label.clone(),
                alternate_labels: e.alternate_labels.clone(),
                role: e.role,
                similarity: similarity.clamp(0.0, 1.0),
            })
            .collect())
    }

    async fn count(&self, vocabulary: &VocabularyCode) -> Result<usize> {
        Ok(self.partitions.get(vocabulary).map_or(0, Vec::len))
    }
}
