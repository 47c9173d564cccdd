//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 공지 청크는 `RETRIEVAL_DOCUMENT`, 사용자 질문은 `RETRIEVAL_QUERY`
//! 태스크 타입으로 임베딩합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env(768)?;
//! let embedding = embedder.embed_query("수강신청 기간").await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::GeminiClient;

/// 임베딩 모델 (MRL 지원)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 지원 차원
const VALID_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 태스크 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// 색인할 문서
    Document,
    /// 검색 질의
    Query,
}

impl EmbeddingTask {
    fn as_api_str(self) -> &'static str {
        match self {
            EmbeddingTask::Document => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, EmbeddingTask::Query).await
    }

    /// 문서 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding chunk {}/{}", i + 1, texts.len());
            results.push(self.embed(text, EmbeddingTask::Document).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: GeminiClient,
    dimension: usize,
}

impl GeminiEmbedding {
    /// 공유 클라이언트로 생성
    ///
    /// # Arguments
    /// * `client` - Gemini 클라이언트
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn new(client: GeminiClient, dimension: usize) -> Result<Self> {
        if !VALID_DIMENSIONS.contains(&dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            );
        }

        Ok(Self { client, dimension })
    }

    /// 환경변수의 API 키로 생성
    pub fn from_env(dimension: usize) -> Result<Self> {
        let client = GeminiClient::from_env().context("Failed to create Gemini client")?;
        Self::new(client, dimension)
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: format!("models/{}", EMBEDDING_MODEL),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task.as_api_str(),
            output_dimensionality: self.dimension,
        };

        let url = GeminiClient::model_url(EMBEDDING_MODEL, "embedContent");
        let response: EmbedResponse = self
            .client
            .post_json(&url, &request)
            .await
            .context("Failed to embed text")?;

        if response.embedding.values.len() != self.dimension {
            anyhow::bail!(
                "Unexpected embedding size: {} (expected {})",
                response.embedding.values.len(),
                self.dimension
            );
        }

        // 768/1536 차원 출력은 단위 길이가 아님 (LanceDB는 L2 거리로 검색)
        let mut values = response.embedding.values;
        l2_normalize(&mut values);
        Ok(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        EMBEDDING_MODEL
    }
}

/// 벡터를 단위 길이로 정규화 (영벡터는 그대로)
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        values.iter_mut().for_each(|v| *v /= norm);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_client() -> GeminiClient {
        GeminiClient::new("fake_key".to_string()).unwrap()
    }

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::new(fake_client(), 999);
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Invalid dimension"));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in VALID_DIMENSIONS {
            assert!(GeminiEmbedding::new(fake_client(), dim).is_ok());
        }
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }

    #[test]
    fn test_task_type_strings() {
        assert_eq!(EmbeddingTask::Document.as_api_str(), "RETRIEVAL_DOCUMENT");
        assert_eq!(EmbeddingTask::Query.as_api_str(), "RETRIEVAL_QUERY");
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbedRequest {
            model: "models/gemini-embedding-001".to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: "장학금".to_string(),
                }],
            },
            task_type: EmbeddingTask::Query.as_api_str(),
            output_dimensionality: 768,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "장학금");
    }

    #[tokio::test]
    async fn test_empty_text_returns_zero_vector() {
        let embedder = GeminiEmbedding::new(fake_client(), 768).unwrap();
        let v = embedder.embed("   ", EmbeddingTask::Query).await.unwrap();
        assert_eq!(v.len(), 768);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
