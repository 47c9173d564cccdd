//! 공지 색인기 - 공지 파일 → SQLite(FTS5) + LanceDB
//!
//! 파일 해시가 같으면 건너뛰고, 바뀐 공지는 청크와 벡터를 교체합니다.
//! 임베딩을 먼저 모두 만든 뒤 저장하고, 파일 해시는 벡터까지 저장된 뒤에 기록합니다.
//! 중간에 실패한 공지는 해시가 비어 있어 다음 실행에서 다시 색인됩니다.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;

use super::chunker::Chunker;
use super::corpus::{collect_notice_files, content_hash, parse_notice};
use super::store::{NewNotice, NoticeStore};
use super::vector::{VectorEntry, VectorStore};

// ============================================================================
// Types
// ============================================================================

/// 파일 하나의 색인 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// 새로 색인됨
    Indexed { chunks: usize },
    /// 내용이 바뀌어 다시 색인됨
    Reindexed { chunks: usize },
    /// 해시가 같아 건너뜀
    Unchanged,
    /// 본문이 없어 건너뜀
    Empty,
}

/// 디렉토리 색인 통계
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub indexed: usize,
    pub reindexed: usize,
    pub unchanged: usize,
    pub empty: usize,
    pub failed: usize,
    pub chunks: usize,
}

impl IndexReport {
    fn record(&mut self, outcome: &IndexOutcome) {
        match outcome {
            IndexOutcome::Indexed { chunks } => {
                self.indexed += 1;
                self.chunks += chunks;
            }
            IndexOutcome::Reindexed { chunks } => {
                self.reindexed += 1;
                self.chunks += chunks;
            }
            IndexOutcome::Unchanged => self.unchanged += 1,
            IndexOutcome::Empty => self.empty += 1,
        }
    }

    /// 처리한 파일 수
    pub fn total(&self) -> usize {
        self.indexed + self.reindexed + self.unchanged + self.empty + self.failed
    }
}

// ============================================================================
// NoticeIndexer
// ============================================================================

/// 공지 색인기
pub struct NoticeIndexer {
    store: Arc<NoticeStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

impl NoticeIndexer {
    pub fn new(
        store: Arc<NoticeStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Box<dyn Chunker>,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder,
            chunker,
        }
    }

    /// 공지 텍스트 색인
    ///
    /// # Arguments
    /// * `file_key` - 공지 식별자 (파일 경로)
    /// * `text` - 공지 파일 전체 텍스트
    /// * `force` - 해시가 같아도 다시 색인
    pub async fn index_text(&self, file_key: &str, text: &str, force: bool) -> Result<IndexOutcome> {
        let existing = self.store.get_notice(file_key)?;

        let Some(notice) = parse_notice(text) else {
            // 본문이 비게 된 공지는 검색되지 않도록 제거
            if let Some(prev) = existing {
                self.remove_notice(prev.id).await?;
                tracing::info!("Removed notice with empty body: {}", file_key);
            }
            tracing::debug!("Skipping empty notice: {}", file_key);
            return Ok(IndexOutcome::Empty);
        };

        let hash = content_hash(text);

        if let Some(ref prev) = existing {
            if !force && prev.content_hash == hash {
                return Ok(IndexOutcome::Unchanged);
            }
        }

        // 1. 청킹
        let chunks = self.chunker.chunk(&notice.indexed_text());
        if chunks.is_empty() {
            return Ok(IndexOutcome::Empty);
        }

        // 2. 임베딩 (저장 전에 모두 생성)
        let embeddings = self
            .embedder
            .embed_documents(&chunks)
            .await
            .with_context(|| format!("Failed to embed notice: {}", file_key))?;

        // 3. SQLite 저장 (기존 청크 교체). 해시는 벡터 저장 후에 기록.
        let stored = self.store.upsert_notice(
            &NewNotice {
                file_key: file_key.to_string(),
                source: notice.source,
                title: notice.title,
                raw_content: notice.body,
                attachments: notice.attachments,
                image_urls: notice.image_urls,
                content_hash: String::new(),
            },
            &chunks,
        )?;

        // 4. 벡터 교체
        if stored.replaced {
            self.vectors
                .delete_by_notice_id(stored.notice_id)
                .await
                .context("Failed to delete old vectors")?;
        }

        let entries: Vec<VectorEntry> = stored
            .chunk_ids
            .iter()
            .zip(embeddings)
            .map(|(&chunk_id, embedding)| VectorEntry {
                chunk_id,
                notice_id: stored.notice_id,
                embedding,
            })
            .collect();

        self.vectors
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        // 5. 완료 표시. 여기까지 오지 못하면 다음 실행에서 다시 색인됨.
        self.store.set_content_hash(stored.notice_id, &hash)?;

        tracing::info!(
            "Indexed notice: {} (id={}, chunks={})",
            file_key,
            stored.notice_id,
            entries.len()
        );

        Ok(if stored.replaced {
            IndexOutcome::Reindexed {
                chunks: entries.len(),
            }
        } else {
            IndexOutcome::Indexed {
                chunks: entries.len(),
            }
        })
    }

    /// 공지와 벡터 삭제
    async fn remove_notice(&self, notice_id: i64) -> Result<()> {
        self.vectors
            .delete_by_notice_id(notice_id)
            .await
            .context("Failed to delete vectors")?;
        self.store.delete_notice(notice_id)?;
        Ok(())
    }

    /// 공지 파일 하나 색인
    pub async fn index_file(&self, path: &Path, force: bool) -> Result<IndexOutcome> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read notice file: {:?}", path))?;

        self.index_text(&path.to_string_lossy(), &text, force).await
    }

    /// 디렉토리의 모든 공지 파일 색인
    ///
    /// 파일별 에러는 기록만 하고 계속 진행합니다.
    pub async fn index_dir(&self, dir: &Path, force: bool) -> Result<IndexReport> {
        let files = collect_notice_files(dir)?;
        tracing::info!(
            "Found {} notice files in {:?} (chunker={}, embedder={})",
            files.len(),
            dir,
            self.chunker.name(),
            self.embedder.name()
        );

        let mut report = IndexReport::default();

        for (i, path) in files.iter().enumerate() {
            match self.index_file(path, force).await {
                Ok(outcome) => {
                    tracing::debug!("[{}/{}] {:?}: {:?}", i + 1, files.len(), path, outcome);
                    report.record(&outcome);
                }
                Err(e) => {
                    tracing::warn!("[{}/{}] Failed to index {:?}: {:#}", i + 1, files.len(), path, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

// ============================================================================
// Tests
// ============================================================================
