//! Gemini API 공통 클라이언트
//!
//! 임베딩과 답변 생성이 같은 API 키, HTTP 클라이언트, Rate Limiter를 공유합니다.
//! - API 키는 URL이 아닌 `x-goog-api-key` 헤더로 전송
//! - 429 에러 시 지수 백오프 재시도
//!
//! source: https://ai.google.dev/gemini-api/docs

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Gemini REST API 베이스 URL
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// API 키 환경변수 (우선순위 순)
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "GOOGLE_AI_API_KEY"];

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 1000;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// Error
// ============================================================================

/// Gemini 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("API 키가 설정되지 않았습니다 (GEMINI_API_KEY 또는 GOOGLE_API_KEY)")]
    MissingApiKey,

    #[error("HTTP 요청 실패: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {message}")]
    Api { status: String, message: String },

    #[error("Rate limit exceeded (429) after {0} retries")]
    RateLimited(u32),

    #[error("응답 파싱 실패: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("모델 응답이 비어 있습니다")]
    EmptyResponse,
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위: `GEMINI_API_KEY` > `GOOGLE_API_KEY` > `GOOGLE_AI_API_KEY`
pub fn get_api_key() -> Result<String, GeminiError> {
    for var in API_KEY_VARS {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }
    Err(GeminiError::MissingApiKey)
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// GeminiClient
// ============================================================================

/// Gemini API 에러 응답 본문
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

/// 공유 Gemini 클라이언트
///
/// `Clone`은 같은 Rate Limiter를 공유합니다.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiClient {
    /// API 키로 생성
    pub fn new(api_key: String) -> Result<Self, GeminiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            api_key,
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
                Duration::from_millis(MIN_DELAY_MS),
            ))),
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self, GeminiError> {
        Self::new(get_api_key()?)
    }

    /// 모델 메서드 URL (`models/<model>:<method>`)
    pub fn model_url(model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/{}:{}", GEMINI_API_BASE, model, method)
    }

    /// JSON POST (429 재시도 포함)
    pub async fn post_json<Req, Resp>(&self, url: &str, request: &Req) -> Result<Resp, GeminiError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = match self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        "Request failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            let body = response.text().await?;

            if status.is_success() {
                return Ok(serde_json::from_str(&body)?);
            }

            if status.as_u16() == 429 {
                if attempt < MAX_RETRIES {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                        backoff,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                break;
            }

            return Err(parse_api_error(status, &body));
        }

        Err(GeminiError::RateLimited(MAX_RETRIES))
    }
}

/// 지수 백오프 간격
fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

/// 에러 응답 본문을 GeminiError로 변환
fn parse_api_error(status: reqwest::StatusCode, body: &str) -> GeminiError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => GeminiError::Api {
            status: if parsed.error.status.is_empty() {
                status.to_string()
            } else {
                parsed.error.status
            },
            message: parsed.error.message,
        },
        Err(_) => GeminiError::Api {
            status: status.to_string(),
            message: body.to_string(),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
