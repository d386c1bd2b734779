//! Authority Matcher: ranked candidates per vocabulary for a topic.
//!
//! One embedding per distinct topic text is computed and reused for every
//! vocabulary queried in the same call. Vocabularies are queried concurrently
//! under a per-vocabulary timeout; a slow or failing vocabulary contributes an
//! empty sublist flagged `unavailable` instead of failing the call.
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use headings_core::config::Settings;
use headings_core::traits::{ensure_usable_vector, Embedder, VocabularyStore};
use headings_core::{AuthorityCandidate, Error, Result, TopicCandidate, VocabularyCode, VocabularyRegistry};

/// Per-request matching parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOptions {
    /// Vocabularies to query, in the order their sublists are returned.
    pub vocabularies: Vec<VocabularyCode>,
    pub per_vocab_limit: usize,
    pub min_score: f32,
}

impl MatchOptions {
    pub fn new(vocabularies: Vec<VocabularyCode>, per_vocab_limit: usize, min_score: f32) -> Self {
        Self { vocabularies, per_vocab_limit, min_score }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let m = &settings.matcher;
        Ok(Self::new(m.vocabulary_codes()?, m.per_vocab_limit, m.min_score))
    }

    pub fn validate(&self) -> Result<()> {
        if self.vocabularies.is_empty() {
            return Err(Error::InvalidInput("at least one vocabulary is required".into()));
        }
        if self.per_vocab_limit == 0 {
            return Err(Error::InvalidInput("per_vocab_limit must be at least 1".into()));
        }
        if !self.min_score.is_finite() || !(0.0..=1.0).contains(&self.min_score) {
            return Err(Error::InvalidInput(format!("min_score must be within [0, 1], got {}", self.min_score)));
        }
        Ok(())
    }

    /// Vocabularies in request order with repeats removed.
    fn distinct_vocabularies(&self) -> Vec<VocabularyCode> {
        let mut out: Vec<VocabularyCode> = Vec::with_capacity(self.vocabularies.len());
        for code in &self.vocabularies {
            if !out.contains(code) {
                out.push(code.clone());
            }
        }
        out
    }
}

/// Results of one vocabulary for one topic, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabularyMatches {
    pub vocabulary: VocabularyCode,
    pub candidates: Vec<AuthorityCandidate>,
    /// The vocabulary timed out or failed; `candidates` is empty.
    pub unavailable: bool,
}

/// Everything the matcher found for one topic, grouped by vocabulary in
/// request order. No ranking is implied across groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicMatches {
    pub topic: TopicCandidate,
    pub groups: Vec<VocabularyMatches>,
}

impl TopicMatches {
    /// Flat list, grouped by vocabulary in request order.
    pub fn candidates(&self) -> impl Iterator<Item = &AuthorityCandidate> {
        self.groups.iter().flat_map(|g| g.candidates.iter())
    }

    pub fn into_candidates(self) -> Vec<AuthorityCandidate> {
        self.groups.into_iter().flat_map(|g| g.candidates).collect()
    }

    pub fn for_vocabulary(&self, vocabulary: &VocabularyCode) -> Option<&VocabularyMatches> {
        self.groups.iter().find(|g| &g.vocabulary == vocabulary)
    }

    pub fn unavailable_count(&self) -> usize {
        self.groups.iter().filter(|g| g.unavailable).count()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.candidates.is_empty())
    }
}

pub const DEFAULT_VOCABULARY_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_TOPIC_CONCURRENCY: usize = 4;

pub struct AuthorityMatcher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VocabularyStore>,
    registry: Arc<VocabularyRegistry>,
    defaults: MatchOptions,
    vocabulary_timeout: Duration,
    topic_concurrency: usize,
}

impl AuthorityMatcher {
    /// Fails with `UnknownVocabulary` when a default vocabulary has no
    /// registry row, so misconfiguration surfaces before the first request.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VocabularyStore>,
        registry: Arc<VocabularyRegistry>,
        defaults: MatchOptions,
    ) -> Result<Self> {
        defaults.validate().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        registry.ensure_covers(&defaults.vocabularies)?;
        Ok(Self {
            embedder,
            store,
            registry,
            defaults,
            vocabulary_timeout: DEFAULT_VOCABULARY_TIMEOUT,
            topic_concurrency: DEFAULT_TOPIC_CONCURRENCY,
        })
    }

    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VocabularyStore>,
    ) -> Result<Self> {
        let registry = Arc::new(settings.registry()?);
        Ok(Self::new(embedder, store, registry, MatchOptions::from_settings(settings)?)?
            .with_vocabulary_timeout(settings.matcher.vocabulary_timeout())
            .with_topic_concurrency(settings.matcher.topic_concurrency))
    }

    pub fn with_vocabulary_timeout(mut self, timeout: Duration) -> Self {
        self.vocabulary_timeout = timeout;
        self
    }

    pub fn with_topic_concurrency(mut self, concurrency: usize) -> Self {
        self.topic_concurrency = concurrency.max(1);
        self
    }

    pub fn defaults(&self) -> &MatchOptions {
        &self.defaults
    }

    pub fn registry(&self) -> &VocabularyRegistry {
        &self.registry
    }

    /// Match one topic against `options.vocabularies`.
    pub async fn match_topic(&self, topic: &TopicCandidate, options: &MatchOptions) -> Result<TopicMatches> {
        let text = self.check_request(topic, options)?;
        let vector = self.embed_one(text).await?;
        Ok(self.query_vocabularies(topic, &vector, options).await)
    }

    /// Match many topics. Each distinct topic text is embedded once, in a
    /// single batch call; topics are then queried with bounded concurrency.
    /// Output order follows input order.
    pub async fn match_topics(&self, topics: &[TopicCandidate], options: &MatchOptions) -> Result<Vec<TopicMatches>> {
        if topics.is_empty() {
            return Ok(vec![]);
        }
        let mut distinct: Vec<String> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        for topic in topics {
            let text = self.check_request(topic, options)?;
            if !slot.contains_key(text) {
                slot.insert(text, distinct.len());
                distinct.push(text.to_string());
            }
        }
        let vectors = self.embed_many(&distinct).await?;
        debug!(topics = topics.len(), distinct = distinct.len(), "embedded topic batch");

        let results: Vec<TopicMatches> = stream::iter(topics.iter())
            .map(|topic| {
                let vector = &vectors[slot[topic.text.trim()]];
                self.query_vocabularies(topic, vector, options)
            })
            .buffered(self.topic_concurrency)
            .collect()
            .await;
        Ok(results)
    }

    /// `match_topic` that stops as soon as `cancel` fires. Outstanding
    /// embedding and vocabulary queries are dropped and nothing partial is
    /// returned.
    pub async fn match_topic_cancellable(
        &self,
        topic: &TopicCandidate,
        options: &MatchOptions,
        cancel: &CancellationToken,
    ) -> Result<TopicMatches> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(topic = %topic.text, "match cancelled");
                Err(Error::Cancelled)
            }
            result = self.match_topic(topic, options) => result,
        }
    }

    fn check_request<'t>(&self, topic: &'t TopicCandidate, options: &MatchOptions) -> Result<&'t str> {
        options.validate()?;
        for code in &options.vocabularies {
            if !self.defaults.vocabularies.contains(code) {
                return Err(Error::InvalidInput(format!("vocabulary '{code}' is not enabled for matching")));
            }
        }
        let text = topic.text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("topic text is empty".into()));
        }
        Ok(text)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| Error::EmbeddingUnavailable("provider returned no vector".into()))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed_batch(texts).await.map_err(|e| match e {
            Error::EmbeddingUnavailable(_) => e,
            other => Error::EmbeddingUnavailable(other.to_string()),
        })?;
        if vectors.len() != texts.len() {
            return Err(Error::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        for v in &vectors {
            ensure_usable_vector(v, self.embedder.dim())?;
        }
        Ok(vectors)
    }

    async fn query_vocabularies(&self, topic: &TopicCandidate, vector: &[f32], options: &MatchOptions) -> TopicMatches {
        let vocabularies = options.distinct_vocabularies();
        let groups = join_all(vocabularies.iter().map(|code| self.query_one(code, vector, options))).await;
        let matches = TopicMatches { topic: topic.clone(), groups };
        debug!(
            topic = %topic.text,
            candidates = matches.candidates().count(),
            unavailable = matches.unavailable_count(),
            "matched topic"
        );
        matches
    }

    async fn query_one(&self, code: &VocabularyCode, vector: &[f32], options: &MatchOptions) -> VocabularyMatches {
        let search = self.store.nearest_neighbors(code, vector, options.per_vocab_limit);
        let outcome = match tokio::time::timeout(self.vocabulary_timeout, search).await {
            Ok(result) => result,
            Err(_) => Err(Error::vocabulary_unavailable(
                code.as_str(),
                format!("no answer within {} ms", self.vocabulary_timeout.as_millis()),
            )),
        };
        match outcome {
            Ok(neighbors) => {
                let mut candidates: Vec<AuthorityCandidate> = neighbors
                    .into_iter()
                    .map(|n| n.into_candidate(code))
                    .filter(|c| c.score >= options.min_score)
                    .collect();
                candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                candidates.truncate(options.per_vocab_limit);
                VocabularyMatches { vocabulary: code.clone(), candidates, unavailable: false }
            }
            Err(e) => {
                warn!(vocabulary = %code, error = %e, "vocabulary query failed, continuing without it");
                VocabularyMatches { vocabulary: code.clone(), candidates: vec![], unavailable: true }
            }
        }
    }
}
