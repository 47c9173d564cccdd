//! 답변 생성기 - Gemini generateContent
//!
//! source: https://ai.google.dev/api/generate-content

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::{GeminiClient, GeminiError};

/// 기본 생성 모델
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-pro";

/// 답변 생성 에러
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Gemini(#[from] GeminiError),

    #[error("응답이 차단되었습니다 ({0})")]
    Blocked(String),
}

/// 답변 생성기 트레이트
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// 프롬프트 → 답변 텍스트
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// 모델 이름
    fn model(&self) -> &str;
}

// ============================================================================
// GeminiGenerator
// ============================================================================

/// Gemini 답변 생성기
pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

impl GeminiGenerator {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.2,
        }
    }

    /// 환경변수 API 키로 생성
    pub fn from_env(model: impl Into<String>) -> Result<Self, GenerationError> {
        Ok(Self::new(GeminiClient::from_env()?, model))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = GeminiClient::model_url(&self.model, "generateContent");
        let response: GenerateResponse = self.client.post_json(&url, &self.request(prompt)).await?;

        let text = response.into_text()?;
        tracing::debug!("Generated {} chars with {}", text.chars().count(), self.model);
        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 조각을 이어 붙임
    fn into_text(self) -> Result<String, GenerationError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GenerationError::Blocked(reason));
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(GeminiError::EmptyResponse.into());
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_default();
            if matches!(reason.as_str(), "SAFETY" | "RECITATION" | "BLOCKLIST") {
                return Err(GenerationError::Blocked(reason));
            }
            return Err(GeminiError::EmptyResponse.into());
        }

        Ok(text)
    }
}

// ============================================================================
// Tests
// ============================================================================
