//! 설정 모듈
//!
//! 기본값 → `config.json` (데이터 디렉토리) → CLI 플래그 순서로 덮어씁니다.
//! 저장 위치: ~/.kau-rag/config.json

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "config.json";

/// 데이터 디렉토리 환경변수
pub const DATA_DIR_ENV: &str = "KAU_RAG_DATA_DIR";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.kau-rag/)
///
/// `KAU_RAG_DATA_DIR`가 설정되어 있으면 그 경로를 사용합니다.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kau-rag")
}

// ============================================================================
// Settings
// ============================================================================

/// 검색 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 키워드(FTS5) 검색기 가중치
    pub lexical_weight: f64,
    /// 벡터 검색기 가중치
    pub vector_weight: f64,
    /// 검색기별 후보 수
    pub fetch_k: usize,
    /// 답변 생성에 사용할 최종 문서 수
    pub top_k: usize,
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 답변 생성 모델
    pub generation_model: String,
    /// 임베딩 차원
    pub embedding_dimension: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lexical_weight: 0.3,
            vector_weight: 0.7,
            fetch_k: 10,
            top_k: 5,
            chunk_size: 350,
            chunk_overlap: 100,
            generation_model: "gemini-2.5-pro".to_string(),
            embedding_dimension: 768,
        }
    }
}

impl Settings {
    /// 데이터 디렉토리의 `config.json`을 읽고, 없으면 기본값 사용
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;

        settings.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(settings)
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            anyhow::bail!("top_k must be at least 1");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be at least 1");
        }
        if self.chunk_overlap >= self.chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.lexical_weight < 0.0 || self.vector_weight < 0.0 {
            anyhow::bail!("retriever weights must not be negative");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
