//! kau-rag - 한국항공대 공지사항 챗봇
//!
//! SQLite FTS5 키워드 검색과 LanceDB 벡터 검색을 가중 순위 합산으로 융합하고,
//! Gemini가 붙인 `[근거: n]` 표기를 출처 링크 목록으로 바꿔 보여줍니다.

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod gemini;
pub mod knowledge;
pub mod retrieval;

// Re-exports
pub use answer::{reconcile, AnswerGenerator, GeminiGenerator, GenerationError, RagPipeline, Reconciled};
pub use config::{get_data_dir, Settings};
pub use embedding::{EmbeddingProvider, EmbeddingTask, GeminiEmbedding};
pub use gemini::{get_api_key, has_api_key, GeminiClient, GeminiError};
pub use knowledge::{
    ChunkConfig, Chunker, LanceVectorStore, NoticeIndexer, NoticeStore, VectorStore,
};
pub use retrieval::{
    fuse_ranked, EnsembleRetriever, LexicalRetriever, RetrievedDocument, Retriever,
    VectorRetriever,
};
