use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use headings_core::config::expand_path;
use headings_core::traits::{ensure_usable_vector, Embedder};
use headings_core::Error;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

pub const BGE_M3_DIM: usize = 1024;
const MAX_LEN: usize = 256;

struct Inner { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device }

/// Local BGE-M3 dense embedder (XLM-RoBERTa encoder, masked mean pooling).
pub struct BgeM3Embedder { inner: Arc<Inner>, id: String }

impl BgeM3Embedder {
    pub fn load(model_dir: Option<&str>) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(model_dir)?;
        info!("Loading BGE-M3 model from {}", model_dir.display());
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("BGE-M3 model loaded");
        Ok(Self { inner: Arc::new(Inner { model, tokenizer, device }), id: format!("bge-m3:d{BGE_M3_DIM}") })
    }
}

impl Inner {
    fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, MAX_LEN, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?.to_dtype(DType::I64)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        let elapsed = start.elapsed().as_millis();
        if elapsed > 100 * texts.len() as u128 { warn!("Slow embedding: {} texts in {} ms", texts.len(), elapsed); }
        debug!("Embedded {} texts in {} ms", texts.len(), elapsed);
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for BgeM3Embedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { BGE_M3_DIM }

    async fn embed_batch(&self, texts: &[String]) -> headings_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(vec![]); }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::EmbeddingUnavailable("cannot embed empty text".into()));
        }
        let inner = Arc::clone(&self.inner);
        let owned = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || inner.embed_blocking(&owned))
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("embedding task failed: {e}")))?
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;
        for v in &vectors { ensure_usable_vector(v, BGE_M3_DIM)?; }
        Ok(vectors)
    }
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        return Err(anyhow!("Configured model dir {} does not exist", p.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { info!("Using {}: {}", var, p.display()); return Ok(p); }
        }
    }
    let root = Path::new("models/bge-m3");
    if root.exists() { return Ok(root.to_path_buf()); }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
