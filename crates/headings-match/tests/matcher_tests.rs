use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use headings_core::traits::{Embedder, VocabularyStore};
use headings_core::vocab_loader::VocabularyLoader;
use headings_core::{Error, Neighbor, Result, Role, TopicCandidate, VocabularyCode, VocabularyRegistry};
use headings_embed::FakeEmbedder;
use headings_match::{AuthorityMatcher, MatchOptions};
use headings_vector::MemoryVocabularyStore;

fn code(s: &str) -> VocabularyCode {
    VocabularyCode::new(s).unwrap()
}

fn options(vocabs: &[&str], limit: usize, min_score: f32) -> MatchOptions {
    MatchOptions::new(vocabs.iter().map(|v| code(v)).collect(), limit, min_score)
}

/// Counts provider calls and embedded texts.
struct CountingEmbedder {
    inner: FakeEmbedder,
    calls: AtomicUsize,
    texts: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self { inner: FakeEmbedder::new(16), calls: AtomicUsize::new(0), texts: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn embedder_id(&self) -> &str { "counting" }
    fn dim(&self) -> usize { 16 }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn embedder_id(&self) -> &str { "failing" }
    fn dim(&self) -> usize { 16 }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::EmbeddingUnavailable("provider offline".into()))
    }
}

/// Returns canned neighbors per vocabulary regardless of the query; can
/// delay or fail individual vocabularies.
#[derive(Default)]
struct ScriptedStore {
    neighbors: HashMap<VocabularyCode, Vec<Neighbor>>,
    delays: HashMap<VocabularyCode, Duration>,
    failing: Vec<VocabularyCode>,
    queries: AtomicUsize,
}

impl ScriptedStore {
    fn with(mut self, vocab: &str, scores: &[f32]) -> Self {
        let list = scores
            .iter()
            .enumerate()
            .map(|(i, s)| Neighbor {
                identifier: format!("{vocab}-{i}"),
                label: format!("{vocab} heading {i}"),
                alternate_labels: vec![],
                role: Some(Role::Topical),
                similarity: *s,
            })
            .collect();
        self.neighbors.insert(code(vocab), list);
        self
    }

    fn slow(mut self, vocab: &str, delay: Duration) -> Self {
        self.delays.insert(code(vocab), delay);
        self
    }

    fn failing(mut self, vocab: &str) -> Self {
        self.failing.push(code(vocab));
        self
    }
}

#[async_trait]
impl VocabularyStore for ScriptedStore {
    async fn nearest_neighbors(&self, vocabulary: &VocabularyCode, _query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(vocabulary) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(vocabulary) {
            return Err(Error::vocabulary_unavailable(vocabulary.as_str(), "connection reset"));
        }
        Ok(self.neighbors.get(vocabulary).map(|n| n.iter().take(k).cloned().collect()).unwrap_or_default())
    }

    async fn count(&self, vocabulary: &VocabularyCode) -> Result<usize> {
        Ok(self.neighbors.get(vocabulary).map_or(0, Vec::len))
    }
}

fn matcher(embedder: Arc<dyn Embedder>, store: Arc<dyn VocabularyStore>) -> AuthorityMatcher {
    AuthorityMatcher::new(embedder, store, Arc::new(VocabularyRegistry::builtin()), options(&["lcsh", "fast"], 5, 0.7))
        .expect("matcher")
}

fn topic(text: &str) -> TopicCandidate {
    TopicCandidate::new(text, Role::Topical)
}

#[tokio::test]
async fn only_vocabulary_above_threshold_contributes() {
    let store = ScriptedStore::default().with("lcsh", &[0.91, 0.62]).with("fast", &[0.70, 0.55]);
    let m = matcher(Arc::new(FakeEmbedder::new(16)), Arc::new(store));
    let result = m.match_topic(&topic("Chinese calligraphy"), &options(&["lcsh", "fast"], 5, 0.75)).await.unwrap();

    assert_eq!(result.groups.len(), 2, "both vocabularies keep a sublist");
    let lcsh = result.for_vocabulary(&code("lcsh")).unwrap();
    assert_eq!(lcsh.candidates.len(), 1);
    assert!((lcsh.candidates[0].score - 0.91).abs() < 1e-6);
    let fast = result.for_vocabulary(&code("fast")).unwrap();
    assert!(fast.candidates.is_empty());
    assert!(!fast.unavailable, "below threshold is not a failure");
    assert!(result.candidates().all(|c| c.vocabulary_code.as_str() == "lcsh"));
}

#[tokio::test]
async fn results_are_capped_sorted_and_above_min_score() {
    let store = ScriptedStore::default()
        .with("lcsh", &[0.72, 0.95, 0.81, 0.99, 0.88, 0.90, 0.40])
        .with("fast", &[0.93, 0.71]);
    let m = matcher(Arc::new(FakeEmbedder::new(16)), Arc::new(store));
    let opts = options(&["fast", "lcsh"], 3, 0.8);
    let result = m.match_topic(&topic("tea"), &opts).await.unwrap();

    let order: Vec<&str> = result.groups.iter().map(|g| g.vocabulary.as_str()).collect();
    assert_eq!(order, vec!["fast", "lcsh"], "groups follow request order");
    for group in &result.groups {
        assert!(group.candidates.len() <= 3);
        for pair in group.candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
    assert!(result.candidates().all(|c| c.score >= 0.8));
}

#[tokio::test]
async fn one_embedding_call_serves_all_vocabularies() {
    let embedder = Arc::new(CountingEmbedder::new());
    let store = Arc::new(ScriptedStore::default().with("lcsh", &[0.9]).with("fast", &[0.9]));
    let m = matcher(embedder.clone(), store.clone());
    m.match_topic(&topic("Porcelain"), m.defaults()).await.unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn batch_embeds_each_distinct_text_once_and_keeps_order() {
    let embedder = Arc::new(CountingEmbedder::new());
    let store = Arc::new(ScriptedStore::default().with("lcsh", &[0.9]));
    let m = matcher(embedder.clone(), store).with_topic_concurrency(2);
    let topics = vec![topic("Tea"), topic("  Tea "), TopicCandidate::new("China", Role::Geographic), topic("Tea")];
    let results = m.match_topics(&topics, &options(&["lcsh"], 5, 0.7)).await.unwrap();

    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(embedder.texts.load(Ordering::SeqCst), 2);
    let texts: Vec<&str> = results.iter().map(|r| r.topic.text.as_str()).collect();
    assert_eq!(texts, vec!["Tea", "  Tea ", "China", "Tea"]);
    assert_eq!(results[2].topic.role_hint, Role::Geographic);
}

#[tokio::test]
async fn embedding_failure_fails_whole_call() {
    let store = Arc::new(ScriptedStore::default().with("lcsh", &[0.9]));
    let m = matcher(Arc::new(FailingEmbedder), store.clone());
    let err = m.match_topic(&topic("Tea"), m.defaults()).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    assert!(err.is_transient());
    assert_eq!(store.queries.load(Ordering::SeqCst), 0, "no vocabulary is queried without a vector");

    let err = m.match_topics(&[topic("Tea"), topic("China")], m.defaults()).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(_)));
}

#[tokio::test]
async fn slow_vocabulary_times_out_into_empty_sublist() {
    let store = ScriptedStore::default()
        .with("lcsh", &[0.9])
        .with("fast", &[0.95])
        .slow("fast", Duration::from_secs(5));
    let m = matcher(Arc::new(FakeEmbedder::new(16)), Arc::new(store)).with_vocabulary_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let result = m.match_topic(&topic("Tea"), m.defaults()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    let fast = result.for_vocabulary(&code("fast")).unwrap();
    assert!(fast.unavailable && fast.candidates.is_empty());
    assert_eq!(result.for_vocabulary(&code("lcsh")).unwrap().candidates.len(), 1);
    assert_eq!(result.unavailable_count(), 1);
}

#[tokio::test]
async fn failing_vocabulary_degrades_gracefully() {
    let store = ScriptedStore::default().with("lcsh", &[0.9]).failing("lcsh").with("fast", &[0.8]);
    let m = matcher(Arc::new(FakeEmbedder::new(16)), Arc::new(store));
    let result = m.match_topic(&topic("Tea"), m.defaults()).await.unwrap();
    assert!(result.for_vocabulary(&code("lcsh")).unwrap().unavailable);
    assert_eq!(result.for_vocabulary(&code("fast")).unwrap().candidates.len(), 1);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let m = matcher(Arc::new(FakeEmbedder::new(16)), Arc::new(ScriptedStore::default()));
    let err = m.match_topic(&topic("   "), m.defaults()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    let err = m.match_topic(&topic("Tea"), &options(&["lcsh"], 0, 0.5)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    let err = m.match_topic(&topic("Tea"), &options(&["lcsh"], 5, 1.5)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    let err = m.match_topic(&topic("Tea"), &options(&["gtt"], 5, 0.5)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn unregistered_vocabulary_fails_at_construction() {
    let err = AuthorityMatcher::new(
        Arc::new(FakeEmbedder::new(16)),
        Arc::new(ScriptedStore::default()),
        Arc::new(VocabularyRegistry::builtin()),
        options(&["lcsh", "mesh"], 5, 0.7),
    )
    .err()
    .expect("construction must fail");
    assert!(matches!(err, Error::UnknownVocabulary(c) if c == "mesh"));
}

#[tokio::test]
async fn cancellation_discards_partial_results() {
    let store = ScriptedStore::default()
        .with("lcsh", &[0.9])
        .with("fast", &[0.9])
        .slow("fast", Duration::from_secs(5));
    let m = matcher(Arc::new(FakeEmbedder::new(16)), Arc::new(store)).with_vocabulary_timeout(Duration::from_secs(10));
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });
    let started = Instant::now();
    let err = m.match_topic_cancellable(&topic("Tea"), m.defaults(), &token).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn cancelled_token_skips_the_embedding_call() {
    let embedder = Arc::new(CountingEmbedder::new());
    let m = matcher(embedder.clone(), Arc::new(ScriptedStore::default()));
    let token = CancellationToken::new();
    token.cancel();
    let err = m.match_topic_cancellable(&topic("Tea"), m.defaults(), &token).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn matches_sample_vocabularies_end_to_end() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap().join("test_data/vocab");
    let entries = VocabularyLoader::new().load_path(&dir).expect("load");
    let embedder = Arc::new(FakeEmbedder::new(1024));
    let store = MemoryVocabularyStore::build(embedder.as_ref(), entries).await.expect("store");
    let m = matcher(embedder, Arc::new(store));

    let result = m.match_topic(&topic("Chinese calligraphy"), &options(&["lcsh", "fast"], 2, 0.9)).await.unwrap();
    let labels: Vec<(&str, &str)> =
        result.candidates().map(|c| (c.vocabulary_code.as_str(), c.label.as_str())).collect();
    assert_eq!(labels, vec![("lcsh", "Calligraphy, Chinese"), ("fast", "Calligraphy, Chinese")]);
}
