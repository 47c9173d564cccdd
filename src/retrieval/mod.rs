//! Retrieval 모듈 - 검색기 인터페이스와 앙상블 순위 융합
//!
//! - `Retriever`: 질의 → 순위가 매겨진 문서 목록 (유일한 검색기 계약)
//! - `LexicalRetriever`: SQLite FTS5 (BM25)
//! - `VectorRetriever`: Gemini 임베딩 + LanceDB
//! - `EnsembleRetriever`: 가중 순위 점수 합산으로 두 목록 융합

mod ensemble;
mod lexical;
mod semantic;

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;

use crate::knowledge::ChunkRecord;

pub use ensemble::{
    fuse_ranked, fuse_scored, EnsembleRetriever, RankedList, ScoredDocument, DEFAULT_K,
    PER_RETRIEVER_LIMIT,
};
pub use lexical::LexicalRetriever;
pub use semantic::VectorRetriever;

/// 메타데이터 키
pub const META_TITLE: &str = "title";
pub const META_SOURCE: &str = "source";
pub const META_RAW_CONTENT: &str = "raw_content";
pub const META_ATTACHMENTS: &str = "attachments";
pub const META_IMAGE_URLS: &str = "image_urls";

// ============================================================================
// RetrievedDocument
// ============================================================================

/// 검색기가 반환하는 문서 (불변)
///
/// `Hash`/`Eq`는 `(content, 정렬된 metadata)` 기준이며 융합 단계의 중복 판정에 쓰입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetrievedDocument {
    /// 검색/모델에 보여지는 청크 텍스트
    pub content: String,
    /// 메타데이터 (키 순 정렬)
    pub metadata: BTreeMap<String, String>,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// 메타데이터 추가 (builder)
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 메타데이터 조회
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// 제목 (없으면 None)
    pub fn title(&self) -> Option<&str> {
        self.meta(META_TITLE)
    }

    /// 출처 URL (없으면 빈 문자열)
    pub fn source(&self) -> &str {
        self.meta(META_SOURCE).unwrap_or("")
    }

    /// 모델에 보여줄 본문 (`raw_content` 우선)
    pub fn raw_content(&self) -> &str {
        self.meta(META_RAW_CONTENT).unwrap_or(&self.content)
    }

    /// `파일명|URL;...` 첨부파일 목록
    pub fn attachments(&self) -> Option<&str> {
        self.meta(META_ATTACHMENTS)
    }
}

impl From<ChunkRecord> for RetrievedDocument {
    fn from(record: ChunkRecord) -> Self {
        let mut doc = RetrievedDocument::new(record.content)
            .with_meta(META_TITLE, record.title)
            .with_meta(META_SOURCE, record.source)
            .with_meta(META_RAW_CONTENT, record.raw_content);

        if let Some(attachments) = record.attachments {
            doc = doc.with_meta(META_ATTACHMENTS, attachments);
        }
        if let Some(image_urls) = record.image_urls {
            doc = doc.with_meta(META_IMAGE_URLS, image_urls);
        }
        doc
    }
}

// ============================================================================
// Retriever Trait
// ============================================================================

/// 검색기 트레이트
///
/// 순위 순서대로 문서를 반환합니다. 실패는 호출자(앙상블)가 빈 결과로 처리합니다.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// 질의에 대한 순위 목록
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>>;

    /// 검색기 이름 (로그/표시용)
    fn name(&self) -> &str;
}

// ============================================================================
// Post-fusion Dedup
// ============================================================================

/// `(source, title)` 기준 중복 제거 (첫 번째 유지)
///
/// 같은 공지의 서로 다른 청크가 융합 결과에 함께 들어오면 하나만 남깁니다.
pub fn dedup_by_source_title(docs: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
    let mut seen: HashSet<(String, String)> = HashSet::new();

    docs.into_iter()
        .filter(|d| {
            let key = (
                d.source().to_string(),
                d.title().unwrap_or("").to_string(),
            );
            seen.insert(key)
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
