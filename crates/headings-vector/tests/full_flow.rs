use std::path::PathBuf;
use std::sync::Arc;

use headings_core::traits::{Embedder, VocabularyStore};
use headings_core::vocab_loader::VocabularyLoader;
use headings_core::{Role, VocabularyCode};
use headings_embed::FakeEmbedder;
use headings_vector::{build_vocabulary_index, IndexOutcome, LanceVocabularyStore, MemoryVocabularyStore, VocabularyIndexer};
use tempfile::TempDir;

fn vocab_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap().join("test_data/vocab")
}

fn code(s: &str) -> VocabularyCode { VocabularyCode::new(s).unwrap() }

#[tokio::test]
async fn lancedb_full_flow() {
    let entries = VocabularyLoader::new().load_path(&vocab_dir()).expect("load");
    assert_eq!(entries.len(), 10);
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(64));
    let tmp = TempDir::new().expect("tmp");

    let indexer = VocabularyIndexer::new(tmp.path(), embedder.clone()).await.expect("indexer").with_batch_size(3);
    let report = indexer.index_entries(entries.clone()).await.expect("index");
    assert_eq!(report.total(), 10);

    let store = LanceVocabularyStore::open(tmp.path()).await.expect("store");
    assert_eq!(store.count(&code("lcsh")).await.unwrap(), 6);
    assert_eq!(store.count(&code("fast")).await.unwrap(), 4);
    assert_eq!(store.indexed_with(&code("fast")).await.unwrap().as_deref(), Some("fake:d64"));

    let query = embedder.embed("Chinese calligraphy").await.unwrap();
    let hits = store.nearest_neighbors(&code("lcsh"), &query, 3).await.expect("search");
    eprintln!("Lance: 'Chinese calligraphy' -> {:?}", hits.iter().map(|h| (&h.label, h.similarity)).collect::<Vec<_>>());
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].label, "Calligraphy, Chinese");
    assert_eq!(hits[0].alternate_labels, vec!["Chinese calligraphy"]);
    assert_eq!(hits[0].role, Some(Role::Topical));
    assert!(hits[0].similarity > 0.99);
    for pair in hits.windows(2) { assert!(pair[0].similarity >= pair[1].similarity); }

    // Re-indexing is an upsert keyed by identifier.
    indexer.index_entries(entries).await.expect("reindex");
    assert_eq!(store.count(&code("lcsh")).await.unwrap(), 6);
}

#[tokio::test]
async fn unindexed_vocabulary_yields_empty_list() {
    let tmp = TempDir::new().expect("tmp");
    let store = LanceVocabularyStore::open(tmp.path()).await.expect("store");
    let hits = store.nearest_neighbors(&code("gtt"), &[1.0; 8], 5).await.expect("search");
    assert!(hits.is_empty());
    assert_eq!(store.count(&code("gtt")).await.unwrap(), 0);
}

#[tokio::test]
async fn indexing_with_a_different_embedder_is_refused() {
    let entries = VocabularyLoader::new().only(code("fast")).load_path(&vocab_dir()).expect("load");
    let tmp = TempDir::new().expect("tmp");
    VocabularyIndexer::new(tmp.path(), Arc::new(FakeEmbedder::new(64)))
        .await
        .unwrap()
        .index_entries(entries.clone())
        .await
        .expect("first run");
    let err = VocabularyIndexer::new(tmp.path(), Arc::new(FakeEmbedder::new(32)))
        .await
        .unwrap()
        .index_entries(entries)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("fake:d64"));
}

#[tokio::test]
async fn small_tables_skip_ann_index() {
    let entries = VocabularyLoader::new().only(code("fast")).load_path(&vocab_dir()).expect("load");
    let tmp = TempDir::new().expect("tmp");
    let indexer = VocabularyIndexer::new(tmp.path(), Arc::new(FakeEmbedder::new(64))).await.unwrap();
    indexer.index_entries(entries).await.unwrap();
    let conn = headings_vector::table::open_db(tmp.path().to_string_lossy().as_ref()).await.unwrap();
    let outcome = build_vocabulary_index(&conn, &code("fast"), 64, 10_000).await.unwrap();
    assert_eq!(outcome, IndexOutcome::Skipped { rows: 4 });
}

#[tokio::test]
async fn memory_store_ranks_like_lance_store() {
    let entries = VocabularyLoader::new().load_path(&vocab_dir()).expect("load");
    let embedder = FakeEmbedder::new(1024);
    let store = MemoryVocabularyStore::build(&embedder, entries).await.expect("build");
    assert_eq!(store.count(&code("fast")).await.unwrap(), 4);
    let query = embedder.embed("Beijing").await.unwrap();
    let hits = store.nearest_neighbors(&code("lcsh"), &query, 2).await.unwrap();
    assert_eq!(hits[0].label, "Beijing (China)");
    assert_eq!(hits[0].role, Some(Role::Geographic));
    assert!(store.nearest_neighbors(&code("ram"), &query, 2).await.unwrap().is_empty());
}
