//! IVF_PQ index builds for vocabulary tables.
//!
//! Small vocabularies are searched exhaustively; once a table reaches
//! `min_rows` an IVF_PQ index (cosine) is trained, checked on a small sample,
//! and its name recorded in the meta table.
use anyhow::Result;
use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray};
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType};
use tracing::{info, warn};

use headings_core::VocabularyCode;

use crate::schema::table_name;
use crate::table::{active_index_key, set_meta, table_exists};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    Built { index_name: String, rows: usize, params: IvfPqParams },
    Skipped { rows: usize },
}

pub fn compute_ivfpq_params(total_rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (total_rows as f64).sqrt() as usize;
    let mut nlist = std::cmp::max(16, sqrt_n);
    nlist = std::cmp::min(nlist, 4096);
    // Clamp nlist to be less than total_rows for tiny datasets
    if total_rows > 1 {
        nlist = std::cmp::min(nlist, total_rows - 1);
    } else {
        nlist = 1;
    }
    // Sub-vectors must divide the dimension.
    let m = [32usize, 16, 8, 4, 2].into_iter().find(|m| dim % m == 0 && dim / m >= 8).unwrap_or(1);
    IvfPqParams { nlist, m }
}

pub async fn build_vocabulary_index(
    conn: &Connection,
    vocabulary: &VocabularyCode,
    dim: usize,
    min_rows: usize,
) -> Result<IndexOutcome> {
    let name = table_name(vocabulary);
    if !table_exists(conn, &name).await? {
        return Ok(IndexOutcome::Skipped { rows: 0 });
    }
    let table = conn.open_table(&name).execute().await?;
    let rows = table.count_rows(None).await?;
    if rows < min_rows.max(1) {
        info!("{}: {} rows below {}, keeping exhaustive search", name, rows, min_rows);
        return Ok(IndexOutcome::Skipped { rows });
    }
    let params = compute_ivfpq_params(rows, dim);
    let index_name = format!("{name}_ivfpq_{}x{}", params.nlist, params.m);
    table
        .create_index(
            &["vector"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(params.nlist as u32)
                    .num_sub_vectors(params.m as u32),
            ),
        )
        .name(index_name.clone())
        .execute()
        .await?;
    if !validate_index(conn, &name, 5, 4).await? {
        warn!("{}: index {} returned no rows for sampled queries", name, index_name);
    }
    set_meta(conn, &active_index_key(vocabulary), &index_name).await?;
    info!("{}: built {} over {} rows", name, index_name, rows);
    Ok(IndexOutcome::Built { index_name, rows, params })
}

/// Very simple validation: sample up to `sample` vectors and ensure top-k returns non-empty.
pub async fn validate_index(conn: &Connection, table: &str, k: usize, sample: usize) -> Result<bool> {
    let tbl = conn.open_table(table).execute().await?;
    let mut stream = tbl.query().select(Select::columns(&["vector"])).limit(sample).execute().await?;
    let mut ok = 0usize;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        if let Some(arr) = batch.column_by_name("vector") {
            if let Some(fsl) = arr.as_any().downcast_ref::<FixedSizeListArray>() {
                for i in 0..batch.num_rows() {
                    if !fsl.is_valid(i) { continue; }
                    let inner = fsl.value(i);
                    let q = inner.as_primitive::<arrow_array::types::Float32Type>().values().to_vec();
                    let mut s = tbl.vector_search(q)?.distance_type(DistanceType::Cosine).limit(k).execute().await?;
                    if let Some(rb) = futures::TryStreamExt::try_next(&mut s).await? {
                        if rb.num_rows() > 0 { ok += 1; }
                    }
                }
            }
        }
    }
    Ok(ok > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_stay_below_row_count_and_divide_dim() {
        let p = compute_ivfpq_params(10, 1024);
        assert_eq!(p.nlist, 9);
        assert_eq!(1024 % p.m, 0);
        let p = compute_ivfpq_params(1_000_000, 1024);
        assert_eq!(p.nlist, 1000);
        assert_eq!(p.m, 32);
        assert_eq!(compute_ivfpq_params(50_000, 24).m, 2);
    }
}
