//! Wiring shared by the `headings` and `headings-indexer` binaries.
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use headings_core::config::{Config, Settings};
use headings_core::vocab_loader::VocabularyLoader;
use headings_core::{Embedder, Explainer, TopicCandidate, VocabularyCode, VocabularyStore};
use headings_marc::{ChatExplainer, ScoreExplainer};
use headings_match::calibrate::calibrations_from_config;
use headings_match::ScoreCalibration;
use headings_vector::{LanceVocabularyStore, MemoryVocabularyStore};

/// Logs go to stderr so stdout stays clean for results.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

pub struct AppContext {
    pub config: Config,
    pub settings: Settings,
    /// Relative paths in the configuration resolve against this directory.
    pub base_dir: PathBuf,
}

impl AppContext {
    pub fn load() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config, std::env::current_dir()?)
    }

    pub fn from_config(config: Config, base_dir: PathBuf) -> Result<Self> {
        let settings = config.settings()?;
        Ok(Self { config, settings, base_dir })
    }

    pub fn lancedb_path(&self) -> PathBuf {
        self.settings.store.lancedb_path(&self.base_dir)
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        headings_embed::embedder_from_settings(&self.settings.embedding)
    }

    /// In-memory store built from vocabulary files when `vocab_dir` is given,
    /// otherwise the LanceDB store written by `headings-indexer`.
    pub async fn store(&self, vocab_dir: Option<&Path>, embedder: &dyn Embedder) -> Result<Arc<dyn VocabularyStore>> {
        if let Some(dir) = vocab_dir {
            let entries = VocabularyLoader::new().load_path(dir)?;
            info!("Embedding {} vocabulary entries from {}", entries.len(), dir.display());
            let store = MemoryVocabularyStore::build(embedder, entries).await?;
            return Ok(Arc::new(store));
        }
        let path = self.lancedb_path();
        let store = LanceVocabularyStore::open(&path)
            .await
            .with_context(|| format!("failed to open vocabulary store at {}", path.display()))?;
        for code in self.settings.matcher.vocabulary_codes()? {
            match store.indexed_with(&code).await? {
                Some(id) if id != embedder.embedder_id() => warn!(
                    "{code} was indexed with '{id}' but queries use '{}'; scores will be meaningless",
                    embedder.embedder_id()
                ),
                None => warn!("{code} has not been indexed yet"),
                _ => {}
            }
        }
        Ok(Arc::new(store))
    }

    /// The chat explainer when `explanation.enabled`, the score template otherwise.
    pub fn explainer(&self) -> Result<Box<dyn Explainer>> {
        if self.settings.explanation.enabled {
            return Ok(Box::new(ChatExplainer::from_settings(&self.settings.explanation)?));
        }
        Ok(Box::new(ScoreExplainer))
    }

    /// Per-vocabulary calibrations from the `[calibration]` table; empty when absent.
    pub fn calibrations(&self) -> Result<HashMap<VocabularyCode, ScoreCalibration>> {
        if !self.config.contains("calibration") {
            return Ok(HashMap::new());
        }
        let raw: HashMap<String, ScoreCalibration> = self.config.get("calibration")?;
        Ok(calibrations_from_config(raw)?)
    }
}

/// Topics from a JSON array of `{"topic": ..., "type": ...}` objects.
pub fn read_topics(path: &Path) -> Result<Vec<TopicCandidate>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{}: expected a JSON array of topics", path.display()))
}
