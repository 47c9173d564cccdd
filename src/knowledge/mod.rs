//! Knowledge 모듈 - 공지 코퍼스 저장소
//!
//! - Corpus: 크롤러가 저장한 공지 텍스트 파일 파싱
//! - Chunker: 재귀 문자 분할 (350자 / 오버랩 100자)
//! - SQLite: 공지/청크 저장 + FTS5 키워드 검색
//! - LanceDB: 청크 임베딩 벡터 검색 (ANN)
//! - Indexer: 파일 → 두 저장소 동기 색인

mod chunker;
mod corpus;
mod indexer;
mod lance;
mod store;
mod vector;

// Re-exports
pub use chunker::{recursive_chunker, ChunkConfig, Chunker, RecursiveChunker};
pub use corpus::{
    collect_notice_files, content_hash, parse_notice, NoticeFile, DEFAULT_TITLE, SEPARATOR,
};
pub use indexer::{IndexOutcome, IndexReport, NoticeIndexer};
pub use lance::LanceVectorStore;
pub use store::{
    ChunkRecord, FtsHit, NewNotice, Notice, NoticeStore, StoreStats, StoredNotice,
};
pub use vector::{cosine_similarity, MemoryVectorStore, VectorEntry, VectorHit, VectorStore};

/// SQLite 파일 이름
pub const KNOWLEDGE_DB_FILE: &str = "knowledge.db";

/// LanceDB 디렉토리 이름
pub const VECTOR_DIR: &str = "vectors.lance";
