use anyhow::Result;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::info;
use twox_hash::XxHash64;

use headings_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use headings_core::traits::Embedder;
use headings_core::Error;

pub mod device;
pub mod model;
pub mod openai;
pub mod pool;
pub mod tokenize;

pub use model::{BgeM3Embedder, BGE_M3_DIM};
pub use openai::OpenAiEmbedder;
pub use pool::masked_mean_l2;

/// Deterministic token-hashing embedder for tests and development.
///
/// Tokens are lower-cased words; texts sharing words land close together, so
/// it behaves enough like a semantic model to exercise ranking code.
pub struct FakeEmbedder { dim: usize, id: String }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("fake:d{dim}") } }

    pub fn embed_sync(&self, text: &str) -> headings_core::Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        let mut seen = 0usize;
        for token in tokens {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val;
            seen += 1;
        }
        if seen == 0 {
            return Err(Error::EmbeddingUnavailable(format!("no tokens to embed in '{text}'")));
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> headings_core::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_sync(t)).collect()
    }
}

fn fake_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the embedder named by `settings.provider`.
/// `APP_USE_FAKE_EMBEDDINGS=1` overrides the choice with [`FakeEmbedder`].
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_forced() || settings.provider == EmbeddingProviderKind::Fake {
        info!("Using FakeEmbedder (d{})", settings.dimension);
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    match settings.provider {
        EmbeddingProviderKind::BgeM3 => {
            anyhow::ensure!(
                settings.dimension == BGE_M3_DIM,
                "bge-m3 produces {BGE_M3_DIM}-dimensional vectors, embedding.dimension is {}",
                settings.dimension
            );
            Ok(Arc::new(BgeM3Embedder::load(settings.model_dir.as_deref())?))
        }
        EmbeddingProviderKind::OpenAi => Ok(Arc::new(OpenAiEmbedder::from_settings(settings)?)),
        EmbeddingProviderKind::Fake => Ok(Arc::new(FakeEmbedder::new(settings.dimension))),
    }
}

pub fn get_default_embedder() -> Result<Arc<dyn Embedder>> {
    embedder_from_settings(&EmbeddingSettings::default())
}
