use anyhow::Result;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use headings_cli::{init_tracing, AppContext};
use headings_core::vocab_loader::VocabularyLoader;
use headings_core::VocabularyCode;
use headings_vector::{build_vocabulary_index, IndexOutcome, VocabularyIndexer};

#[derive(Parser, Debug)]
#[command(name = "headings-indexer", about = "Embed vocabulary exports and write them to the LanceDB store")]
struct IndexerCli {
    /// A .jsonl file or a directory of them
    path: PathBuf,

    /// Only index this vocabulary
    #[arg(long)]
    only: Option<String>,

    /// Delete the existing store before indexing
    #[arg(long, default_value_t = false)]
    reset: bool,

    /// Build IVF-PQ indexes for tables above the configured minimum size
    #[arg(long, default_value_t = false)]
    build_index: bool,

    /// Override store.min_rows_for_index
    #[arg(long)]
    min_rows: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = IndexerCli::parse();
    let ctx = AppContext::load().map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;

    println!("Vocabulary Indexer\n==================");
    println!("Source: {}", cli.path.display());
    let mut loader = VocabularyLoader::new();
    if let Some(only) = &cli.only {
        loader = loader.only(VocabularyCode::new(only)?);
    }
    let entries = loader.load_path(&cli.path)?;
    if entries.is_empty() {
        println!("Nothing to index.");
        return Ok(());
    }

    let registry = ctx.settings.registry()?;
    let mut codes: Vec<VocabularyCode> = entries.iter().map(|e| e.vocabulary_code.clone()).collect();
    codes.sort();
    codes.dedup();
    registry.ensure_covers(&codes)?;

    let lancedb_path = ctx.lancedb_path();
    if cli.reset && lancedb_path.exists() {
        println!("⚠️  Removing existing store at {}", lancedb_path.display());
        fs::remove_dir_all(&lancedb_path)?;
    }
    fs::create_dir_all(&lancedb_path)?;

    let embedder = ctx.embedder()?;
    let dim = embedder.dim();
    let indexer = VocabularyIndexer::new(&lancedb_path, embedder)
        .await?
        .with_batch_size(ctx.settings.embedding.batch_size);
    let report = indexer.index_entries(entries).await?;
    for (code, rows) in &report.per_vocabulary {
        println!("📊 {code}: {rows} entries");
    }

    if cli.build_index {
        let min_rows = cli.min_rows.unwrap_or(ctx.settings.store.min_rows_for_index);
        for (code, _) in &report.per_vocabulary {
            match build_vocabulary_index(indexer.connection(), code, dim, min_rows).await? {
                IndexOutcome::Built { index_name, rows, .. } => println!("🔎 {code}: built {index_name} over {rows} rows"),
                IndexOutcome::Skipped { rows } => println!("🔎 {code}: {rows} rows, exhaustive search (below {min_rows})"),
            }
        }
    }

    println!("\n✅ Indexed {} entries into {}", report.total(), lancedb_path.display());
    println!("💡 To match topics, use: cargo run --bin headings -- match '<topic>'");
    Ok(())
}
