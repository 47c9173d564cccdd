//! 벡터 검색기 - 질의 임베딩 → 최근접 청크

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{RetrievedDocument, Retriever, PER_RETRIEVER_LIMIT};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{NoticeStore, VectorStore};

/// 벡터 유사도 검색기
///
/// 벡터 저장소에는 청크 ID만 있으므로 본문은 NoticeStore에서 읽습니다.
pub struct VectorRetriever {
    store: Arc<NoticeStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    limit: usize,
}

impl VectorRetriever {
    pub fn new(
        store: Arc<NoticeStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder,
            limit: PER_RETRIEVER_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .context("Failed to embed query")?;

        let hits = self.vectors.search(&embedding, self.limit).await?;

        let mut docs = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.get_chunk(hit.chunk_id)? {
                Some(record) => docs.push(RetrievedDocument::from(record)),
                // 재색인 도중 삭제된 청크
                None => tracing::debug!("Vector hit for missing chunk {}", hit.chunk_id),
            }
        }

        Ok(docs)
    }

    fn name(&self) -> &str {
        "vector"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingTask;
    use crate::knowledge::{MemoryVectorStore, NewNotice, VectorEntry};
    use tempfile::TempDir;

    /// 키워드 포함 여부로 만드는 2차원 임베딩
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
            let dorm = if text.contains("기숙사") { 1.0 } else { 0.0 };
            let money = if text.contains("장학") { 1.0 } else { 0.0 };
            Ok(vec![dorm, money])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn notice(key: &str, title: &str) -> NewNotice {
        NewNotice {
            file_key: key.to_string(),
            source: format!("https://kau.ac.kr/{}", key),
            title: title.to_string(),
            raw_content: format!("{} 본문", title),
            attachments: None,
            image_urls: None,
            content_hash: format!("hash-{}", key),
        }
    }

    async fn setup() -> (TempDir, Arc<NoticeStore>, Arc<MemoryVectorStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(NoticeStore::open(&dir.path().join("k.db")).unwrap());
        let vectors = Arc::new(MemoryVectorStore::new());

        let dorm = store
            .upsert_notice(&notice("dorm", "기숙사 입사"), &["기숙사 입사 안내".to_string()])
            .unwrap();
        let money = store
            .upsert_notice(&notice("money", "장학금"), &["장학금 지급 안내".to_string()])
            .unwrap();

        vectors
            .insert_batch(&[
                VectorEntry {
                    chunk_id: dorm.chunk_ids[0],
                    notice_id: dorm.notice_id,
                    embedding: vec![1.0, 0.0],
                },
                VectorEntry {
                    chunk_id: money.chunk_ids[0],
                    notice_id: money.notice_id,
                    embedding: vec![0.0, 1.0],
                },
            ])
            .await
            .unwrap();

        (dir, store, vectors)
    }

    #[tokio::test]
    async fn test_nearest_chunk_first() {
        let (_dir, store, vectors) = setup().await;
        let retriever = VectorRetriever::new(store, vectors, Arc::new(KeywordEmbedder));

        let docs = retriever.retrieve("장학금 언제 나와요").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title(), Some("장학금"));
        assert_eq!(docs[0].raw_content(), "장학금 본문");
    }

    #[tokio::test]
    async fn test_missing_chunk_skipped() {
        let (_dir, store, vectors) = setup().await;
        vectors
            .insert_batch(&[VectorEntry {
                chunk_id: 9999,
                notice_id: 9999,
                embedding: vec![1.0, 0.0],
            }])
            .await
            .unwrap();

        let retriever = VectorRetriever::new(store, vectors, Arc::new(KeywordEmbedder));
        let docs = retriever.retrieve("기숙사").await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_query_is_empty() {
        let (_dir, store, vectors) = setup().await;
        let retriever =
            VectorRetriever::new(store, vectors, Arc::new(KeywordEmbedder)).with_limit(1);
        assert!(retriever.retrieve("  ").await.unwrap().is_empty());
    }
}
