use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, RecordBatch};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType};
use std::path::Path;
use tracing::debug;

use headings_core::traits::VocabularyStore;
use headings_core::{Error, Neighbor, Result, Role, VocabularyCode};

use crate::schema::table_name;
use crate::table::{embedder_key, get_meta, open_db, table_exists};

/// Read-only store over the `vocab_<code>` tables written by the indexer.
pub struct LanceVocabularyStore { pub(crate) db: Connection }

impl LanceVocabularyStore {
	pub async fn open(db_path: &Path) -> anyhow::Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		Ok(Self { db })
	}

	/// Embedder id recorded when `vocabulary` was indexed.
	pub async fn indexed_with(&self, vocabulary: &VocabularyCode) -> anyhow::Result<Option<String>> {
		get_meta(&self.db, &embedder_key(vocabulary)).await
	}

	async fn search(&self, vocabulary: &VocabularyCode, query: &[f32], k: usize) -> anyhow::Result<Vec<Neighbor>> {
		let name = table_name(vocabulary);
		if !table_exists(&self.db, &name).await? { return Ok(vec![]); }
		let table = self.db.open_table(&name).execute().await?;
		if table.count_rows(None).await? == 0 { return Ok(vec![]); }
		let mut stream = table
			.vector_search(query.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await?;
		let mut out = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			out.extend(batch_to_neighbors(&batch)?);
		}
		out.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
		out.truncate(k);
		debug!("{}: {} neighbors", name, out.len());
		Ok(out)
	}
}

fn batch_to_neighbors(batch: &RecordBatch) -> anyhow::Result<Vec<Neighbor>> {
	let column = |name: &str| batch.column_by_name(name).ok_or_else(|| anyhow::anyhow!("column '{name}' missing"));
	let identifiers = column("identifier")?.as_string_opt::<i32>().ok_or_else(|| anyhow::anyhow!("identifier is not utf8"))?;
	let labels = column("label")?.as_string_opt::<i32>().ok_or_else(|| anyhow::anyhow!("label is not utf8"))?;
	let alternates = column("alternate_labels")?.as_list_opt::<i32>().ok_or_else(|| anyhow::anyhow!("alternate_labels is not a list"))?;
	let roles = column("role")?.as_string_opt::<i32>().ok_or_else(|| anyhow::anyhow!("role is not utf8"))?;
	let distances = column("_distance")?.as_primitive_opt::<Float32Type>().ok_or_else(|| anyhow::anyhow!("_distance is not f32"))?;

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let alternate_labels = if alternates.is_null(i) {
			vec![]
		} else {
			let values = alternates.value(i);
			values
				.as_string_opt::<i32>()
				.map(|s| s.iter().flatten().map(str::to_string).collect())
				.unwrap_or_default()
		};
		let role = if roles.is_null(i) { None } else { roles.value(i).parse::<Role>().ok() };
		out.push(Neighbor {
			identifier: identifiers.value(i).to_string(),
			label: labels.value(i).to_string(),
			alternate_labels,
			role,
			similarity: (1.0 - distances.value(i)).clamp(0.0, 1.0),
		});
	}
	Ok(out)
}

#[async_trait]
impl VocabularyStore for LanceVocabularyStore {
	async fn nearest_neighbors(&self, vocabulary: &VocabularyCode, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
		self.search(vocabulary, query, k).await.map_err(|e| Error::vocabulary_unavailable(vocabulary.as_str(), format!("{e:#}")))
	}

	async fn count(&self, vocabulary: &VocabularyCode) -> Result<usize> {
		let name = table_name(vocabulary);
		let count = async {
			if !table_exists(&self.db, &name).await? { return Ok::<usize, anyhow::Error>(0); }
			let table = self.db.open_table(&name).execute().await?;
			Ok(table.count_rows(None).await?)
		};
		count.await.map_err(|e| Error::vocabulary_unavailable(vocabulary.as_str(), format!("{e:#}")))
	}
}
