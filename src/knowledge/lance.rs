//! LanceDB Vector Store - 청크 임베딩 저장소
//!
//! ANN (Approximate Nearest Neighbor) 검색으로 청크 ID를 찾고,
//! 본문과 메타데이터는 NoticeStore에서 다시 읽습니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;

use super::vector::{VectorEntry, VectorHit, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunk_vectors";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self { db, dimension })
    }

    /// 벡터 테이블 스키마
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("chunk_id", DataType::Int64, false),
            Field::new("notice_id", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Embedding for chunk {} has {} dimensions (expected {})",
                bad.chunk_id,
                bad.embedding.len(),
                self.dimension
            );
        }

        let chunk_ids: Vec<i64> = entries.iter().map(|e| e.chunk_id).collect();
        let notice_ids: Vec<i64> = entries.iter().map(|e| e.notice_id).collect();
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(Int64Array::from(chunk_ids)),
                Arc::new(Int64Array::from(notice_ids)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    /// 기존 테이블 열기 (없으면 None)
    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.table_exists().await {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")?;
        Ok(Some(table))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add vectors to table")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut hits = Vec::new();

        for batch in batches {
            let chunk_ids = batch
                .column_by_name("chunk_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_id column"))?;

            let notice_ids = batch
                .column_by_name("notice_id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing notice_id column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                // L2 거리 -> 유사도
                let similarity = 1.0 / (1.0 + distances.value(i));

                hits.push(VectorHit {
                    chunk_id: chunk_ids.value(i),
                    notice_id: notice_ids.value(i),
                    similarity,
                });
            }
        }

        // 배치 경계와 무관하게 가까운 순서 유지
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(hits)
    }

    async fn delete_by_notice_id(&self, notice_id: i64) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        // notice_id는 i64 타입으로 검증됨
        let filter = format!("notice_id = {}", notice_id);
        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for notice_id")?;

        if before > 0 {
            table
                .delete(&filter)
                .await
                .context("Failed to delete vectors")?;
        }

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        table.count_rows(None).await.context("Failed to count rows")
    }

    async fn has_embeddings(&self, notice_id: i64) -> Result<bool> {
        let Some(table) = self.open_table().await? else {
            return Ok(false);
        };

        let filter = format!("notice_id = {}", notice_id);
        let count = table
            .count_rows(Some(filter))
            .await
            .context("Failed to count rows for notice_id")?;

        Ok(count > 0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn entry(chunk_id: i64, notice_id: i64, value: f32) -> VectorEntry {
        VectorEntry {
            chunk_id,
            notice_id,
            embedding: vec![value; DIM],
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("test.lance"), DIM)
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 0);

        let inserted = store
            .insert_batch(&[entry(1, 1, 0.1), entry(2, 1, 0.2)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        assert!(store.has_embeddings(1).await.unwrap());
        assert!(!store.has_embeddings(999).await.unwrap());
    }

    #[tokio::test]
    async fn test_lance_search_nearest_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("search.lance"), DIM)
            .await
            .unwrap();

        store
            .insert_batch(&[entry(10, 1, 0.1), entry(20, 2, 0.5), entry(30, 3, 0.9)])
            .await
            .unwrap();

        let hits = store.search(&vec![0.9; DIM], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, 30);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn test_lance_delete_by_notice() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("delete.lance"), DIM)
            .await
            .unwrap();

        store
            .insert_batch(&[entry(1, 1, 0.1), entry(2, 1, 0.2), entry(3, 2, 0.3)])
            .await
            .unwrap();

        assert_eq!(store.delete_by_notice_id(1).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.delete_by_notice_id(42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("dim.lance"), DIM)
            .await
            .unwrap();

        let bad = VectorEntry {
            chunk_id: 1,
            notice_id: 1,
            embedding: vec![0.1; DIM + 1],
        };
        assert!(store.insert_batch(&[bad]).await.is_err());
    }
}
