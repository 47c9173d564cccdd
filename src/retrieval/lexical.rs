//! 키워드 검색기 - SQLite FTS5 (BM25)

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{RetrievedDocument, Retriever, PER_RETRIEVER_LIMIT};
use crate::knowledge::NoticeStore;

/// FTS5 키워드 검색기
///
/// FTS5 질의가 실패하면 LIKE 검색으로 폴백합니다.
pub struct LexicalRetriever {
    store: Arc<NoticeStore>,
    limit: usize,
}

impl LexicalRetriever {
    pub fn new(store: Arc<NoticeStore>) -> Self {
        Self {
            store,
            limit: PER_RETRIEVER_LIMIT,
        }
    }

    /// 후보 수 변경
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>> {
        let records = match self.store.search_fts(query, self.limit) {
            Ok(hits) => {
                if let Some(top) = hits.first() {
                    tracing::debug!("FTS5 {} hits, top bm25 {:.3}", hits.len(), top.bm25_score);
                }
                hits.into_iter().map(|h| h.record).collect()
            }
            Err(e) => {
                tracing::debug!("FTS5 search failed, falling back to LIKE: {}", e);
                self.store.search_like(query, self.limit)?
            }
        };

        Ok(records.into_iter().map(RetrievedDocument::from).collect())
    }

    fn name(&self) -> &str {
        "fts5"
    }
}

// ============================================================================
// Tests
// ============================================================================
