//! Vector Store - 벡터 검색 트레이트
//!
//! 청크 임베딩을 저장하고 최근접 이웃 검색을 제공합니다.
//! 운영에서는 LanceDB, 테스트에서는 메모리 구현을 사용합니다.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 ID (chunks.id)
    pub chunk_id: i64,
    /// 공지 ID (notices.id)
    pub notice_id: i64,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 벡터 검색 결과
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: i64,
    pub notice_id: i64,
    /// 유사도 스코어 (높을수록 유사)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (유사도 내림차순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>>;

    /// notice_id로 벡터 삭제
    async fn delete_by_notice_id(&self, notice_id: i64) -> Result<usize>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 특정 공지의 임베딩 존재 여부
    async fn has_embeddings(&self, notice_id: i64) -> Result<bool>;
}

// ============================================================================
// MemoryVectorStore
// ============================================================================

/// 메모리 벡터 저장소 (전수 코사인 유사도)
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        guard.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let guard = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut hits: Vec<VectorHit> = guard
            .iter()
            .map(|e| VectorHit {
                chunk_id: e.chunk_id,
                notice_id: e.notice_id,
                similarity: cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_notice_id(&self, notice_id: i64) -> Result<usize> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let before = guard.len();
        guard.retain(|e| e.notice_id != notice_id);
        Ok(before - guard.len())
    }

    async fn count(&self) -> Result<usize> {
        let guard = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(guard.len())
    }

    async fn has_embeddings(&self, notice_id: i64) -> Result<bool> {
        let guard = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(guard.iter().any(|e| e.notice_id == notice_id))
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산 (-1.0 ~ 1.0)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_memory_store_search_order() {
        let store = MemoryVectorStore::new();
        store
            .insert_batch(&[
                VectorEntry { chunk_id: 1, notice_id: 1, embedding: vec![0.0, 1.0] },
                VectorEntry { chunk_id: 2, notice_id: 1, embedding: vec![1.0, 0.0] },
                VectorEntry { chunk_id: 3, notice_id: 2, embedding: vec![0.7, 0.7] },
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryVectorStore::new();
        store
            .insert_batch(&[
                VectorEntry { chunk_id: 1, notice_id: 1, embedding: vec![1.0] },
                VectorEntry { chunk_id: 2, notice_id: 1, embedding: vec![1.0] },
                VectorEntry { chunk_id: 3, notice_id: 2, embedding: vec![1.0] },
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_notice_id(1).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(!store.has_embeddings(1).await.unwrap());
        assert!(store.has_embeddings(2).await.unwrap());
    }
}
