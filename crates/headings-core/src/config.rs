//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_MATCHER__MIN_SCORE=0.8`), then
//! extracts typed [`Settings`]. Provides helpers to expand `~` and `${VAR}` and
//! to resolve relative paths against a known base directory.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::{VocabularyRegistry, VocabularyRow};
use crate::types::VocabularyCode;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    /// Wrap an already assembled figment (tests, embedding applications).
    pub fn from_figment(figment: Figment, env_name: impl Into<String>) -> Self {
        Self { figment, env_name: env_name.into() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.figment.contains(key)
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        match self.env_name.as_str() {
            "prod" | "production" => {
                if settings.embedding.provider == EmbeddingProviderKind::Fake {
                    anyhow::bail!("the fake embedding provider is not allowed in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub matcher: MatcherSettings,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    pub explanation: ExplanationSettings,
    /// Registry rows; the built-in registry is used when absent.
    pub vocabularies: Option<Vec<VocabularyRow>>,
}

impl Settings {
    pub fn registry(&self) -> Result<VocabularyRegistry> {
        match &self.vocabularies {
            Some(rows) => VocabularyRegistry::from_rows(rows.clone()),
            None => Ok(VocabularyRegistry::builtin()),
        }
    }

    /// Checks everything that can be checked before the first request:
    /// thresholds, limits, and registry coverage of the enabled vocabularies.
    pub fn validate(&self) -> Result<()> {
        let m = &self.matcher;
        if m.per_vocab_limit == 0 {
            return Err(Error::InvalidConfig("matcher.per_vocab_limit must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&m.min_score) {
            return Err(Error::InvalidConfig(format!(
                "matcher.min_score must be within [0, 1], got {}",
                m.min_score
            )));
        }
        if m.topic_concurrency == 0 {
            return Err(Error::InvalidConfig("matcher.topic_concurrency must be at least 1".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
        }
        let codes = m.vocabulary_codes()?;
        self.registry()?.ensure_covers(&codes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    pub vocabularies: Vec<String>,
    pub per_vocab_limit: usize,
    /// Threshold on raw cosine similarity in `[0, 1]`, not on `(1 + cos) / 2`
    /// certainty; a certainty cutoff of 0.7 corresponds to a cosine of 0.4.
    pub min_score: f32,
    pub vocabulary_timeout_ms: u64,
    pub topic_concurrency: usize,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            vocabularies: vec!["lcsh".into(), "fast".into()],
            per_vocab_limit: 5,
            min_score: 0.7,
            vocabulary_timeout_ms: 2_000,
            topic_concurrency: 4,
        }
    }
}

impl MatcherSettings {
    pub fn vocabulary_codes(&self) -> Result<Vec<VocabularyCode>> {
        if self.vocabularies.is_empty() {
            return Err(Error::InvalidConfig("matcher.vocabularies is empty".into()));
        }
        self.vocabularies
            .iter()
            .map(|v| VocabularyCode::new(v).map_err(|e| Error::InvalidConfig(e.to_string())))
            .collect()
    }

    pub fn vocabulary_timeout(&self) -> Duration {
        Duration::from_millis(self.vocabulary_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderKind {
    #[serde(rename = "fake")]
    Fake,
    #[serde(rename = "bge-m3")]
    BgeM3,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub dimension: usize,
    pub model_dir: Option<String>,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::BgeM3,
            dimension: 1024,
            model_dir: None,
            model: "text-embedding-3-large".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_ms: 30_000,
            max_retries: 3,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub lancedb_dir: String,
    /// Tables smaller than this are searched exhaustively, without an ANN index.
    pub min_rows_for_index: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { lancedb_dir: "data/lancedb".into(), min_rows_for_index: 10_000 }
    }
}

impl StoreSettings {
    pub fn lancedb_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.lancedb_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationSettings {
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ExplanationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_ms: 10_000,
        }
    }
}

impl ExplanationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
