use anyhow::{Context, Result};
use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use headings_core::traits::{ensure_usable_vector, Embedder};
use headings_core::vocab_loader::group_by_vocabulary;
use headings_core::{VocabularyCode, VocabularyEntry};

use crate::schema::{build_vocabulary_schema, table_name};
use crate::table::{embedder_key, ensure_table, get_meta, open_db, set_meta};

/// Rows written per vocabulary during one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
	pub per_vocabulary: Vec<(VocabularyCode, usize)>,
}

impl IndexReport {
	pub fn total(&self) -> usize { self.per_vocabulary.iter().map(|(_, n)| n).sum() }
}

/// Offline writer: embeds vocabulary entries and upserts them into one table
/// per vocabulary, keyed by identifier.
pub struct VocabularyIndexer { pub(crate) db: Connection, embedder: Arc<dyn Embedder>, batch_size: usize }

impl VocabularyIndexer {
	pub async fn new(db_path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		Ok(Self { db, embedder, batch_size: 256 })
	}

	pub fn with_batch_size(mut self, batch_size: usize) -> Self {
		self.batch_size = batch_size.max(1);
		self
	}

	pub fn connection(&self) -> &Connection { &self.db }

	pub async fn index_entries(&self, entries: Vec<VocabularyEntry>) -> Result<IndexReport> {
		let mut report = IndexReport::default();
		if entries.is_empty() { info!("No vocabulary entries to index"); return Ok(report); }
		let pb = ProgressBar::new(entries.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} entries ({percent}%) {msg}")?.progress_chars("#>-"));
		for (vocabulary, group) in group_by_vocabulary(entries) {
			self.check_embedder(&vocabulary).await?;
			let table = table_name(&vocabulary);
			ensure_table(&self.db, &table, build_vocabulary_schema(self.embedder.dim() as i32)).await?;
			let mut written = 0usize;
			for batch in group.chunks(self.batch_size) {
				pb.set_message(format!("{vocabulary}"));
				let texts: Vec<String> = batch.iter().map(VocabularyEntry::embedding_text).collect();
				let vectors = self.embedder.embed_batch(&texts).await.with_context(|| format!("embedding {vocabulary} entries"))?;
				anyhow::ensure!(vectors.len() == batch.len(), "embedder returned {} vectors for {} entries", vectors.len(), batch.len());
				written += self.upsert_batch(&table, batch, &vectors).await?;
				pb.inc(batch.len() as u64);
			}
			set_meta(&self.db, &embedder_key(&vocabulary), self.embedder.embedder_id()).await?;
			info!("Indexed {} entries into {}", written, table);
			report.per_vocabulary.push((vocabulary, written));
		}
		pb.finish_with_message("done");
		Ok(report)
	}

	/// Refuse to mix vectors from two embedders inside one vocabulary table.
	async fn check_embedder(&self, vocabulary: &VocabularyCode) -> Result<()> {
		if let Some(existing) = get_meta(&self.db, &embedder_key(vocabulary)).await? {
			anyhow::ensure!(
				existing == self.embedder.embedder_id(),
				"vocabulary '{vocabulary}' was indexed with '{existing}', current embedder is '{}'; rebuild the table instead",
				self.embedder.embedder_id()
			);
		}
		Ok(())
	}

	async fn upsert_batch(&self, table: &str, entries: &[VocabularyEntry], vectors: &[Vec<f32>]) -> Result<usize> {
		let record_batch = entries_to_record_batch(entries, vectors, self.embedder.dim())?;
		let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		let t = self.db.open_table(table).execute().await?;
		let mut mi = t.merge_insert(&["identifier"]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		let res = mi.execute(reader).await?;
		Ok((res.num_inserted_rows + res.num_updated_rows) as usize)
	}
}

pub fn entries_to_record_batch(entries: &[VocabularyEntry], vectors: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
	let mut identifiers = Vec::with_capacity(entries.len());
	let mut labels = Vec::with_capacity(entries.len());
	let mut alternates = ListBuilder::new(StringBuilder::new());
	let mut roles: Vec<Option<String>> = Vec::with_capacity(entries.len());
	let mut scope_notes: Vec<Option<String>> = Vec::with_capacity(entries.len());
	let mut rows: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(entries.len());
	for (entry, vector) in entries.iter().zip(vectors) {
		ensure_usable_vector(vector, dim)?;
		identifiers.push(entry.identifier.trim().to_string());
		labels.push(entry.label.clone());
		for alt in &entry.alternate_labels { alternates.values().append_value(alt); }
		alternates.append(true);
		roles.push(entry.role.map(|r| r.as_str().to_string()));
		scope_notes.push(entry.scope_note.clone());
		rows.push(Some(vector.iter().map(|&x| Some(x)).collect()));
	}
	let record_batch = RecordBatch::try_new(build_vocabulary_schema(dim as i32), vec![
		Arc::new(StringArray::from(identifiers)),
		Arc::new(StringArray::from(labels)),
		Arc::new(alternates.finish()),
		Arc::new(StringArray::from(roles)),
		Arc::new(StringArray::from(scope_notes)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows.into_iter(), dim as i32)),
	])?;
	Ok(record_batch)
}
