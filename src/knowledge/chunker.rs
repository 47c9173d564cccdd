//! Text Chunking Module
//!
//! 공지 본문을 재귀적으로 분할합니다.
//! 문단(`\n\n`) → 줄(`\n`) → 공백(` `) → 문자 순서로 경계를 낮춰 가며
//! 청크 크기(문자 수 기준)를 넘지 않도록 자르고, 인접 청크 사이에 오버랩을 둡니다.

use std::collections::VecDeque;

use crate::config::Settings;

/// 분할 경계 (우선순위 순, 빈 문자열은 문자 단위)
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 350,
            chunk_overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// 설정에서 생성
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 문자 분할 청커
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // 텍스트에 존재하는 가장 큰 경계 선택
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending, separator));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending, separator));
        }

        chunks
    }

    /// 작은 조각들을 청크 크기까지 이어 붙이고, 다음 청크에 오버랩을 남김
    fn merge_pieces(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { sep_len };

            if total + len + joined_len(&window) > size && !window.is_empty() {
                if let Some(chunk) = join_window(&window, separator) {
                    chunks.push(chunk);
                }

                // 오버랩 크기 이하가 될 때까지 앞에서 제거
                while total > overlap
                    || (total > 0 && total + len + joined_len(&window) > size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    let removed = char_len(front) + if window.is_empty() { 0 } else { sep_len };
                    total = total.saturating_sub(removed);
                }
            }

            window.push_back(piece);
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }

        if let Some(chunk) = join_window(&window, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = self.split_recursive(text, &SEPARATORS);
        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수 (UTF-8 바이트 수가 아님)
#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_window(window: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정을 지정한 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
