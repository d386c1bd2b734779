use headings_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use headings_core::traits::{cosine_similarity, Embedder};
use headings_core::Error;
use headings_embed::{embedder_from_settings, get_default_embedder, FakeEmbedder};

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    // Force fake embedder to avoid loading large model
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");

    let embedder = get_default_embedder().expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 1024, "embedding dim is 1024");
    assert_eq!(embedder.embedder_id(), "fake:d1024");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[tokio::test]
async fn shared_words_score_higher_than_unrelated_text() {
    let embedder = FakeEmbedder::new(256);
    let query = embedder.embed("Chinese calligraphy").await.unwrap();
    let close = embedder.embed("Calligraphy, Chinese").await.unwrap();
    let far = embedder.embed("Periodicals").await.unwrap();
    assert!((cosine_similarity(&query, &close) - 1.0).abs() < 1e-5, "same words in any order and case");
    assert!(cosine_similarity(&query, &far) < 0.5);
}

#[tokio::test]
async fn text_without_tokens_fails_instead_of_zero_vector() {
    let embedder = FakeEmbedder::new(16);
    let err = embedder.embed(" -- ").await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    assert!(err.is_transient());
}

#[test]
fn fake_provider_honours_configured_dimension() {
    let settings = EmbeddingSettings { provider: EmbeddingProviderKind::Fake, dimension: 32, ..Default::default() };
    let embedder = embedder_from_settings(&settings).unwrap();
    assert_eq!(embedder.dim(), 32);
}
