//! 공지사항 텍스트 파일 파서
//!
//! 크롤러가 저장한 공지 파일 형식:
//!
//! ```text
//! 출처 URL: https://kau.ac.kr/kaulife/acdnoti.php?...&seq=9767
//! 제목: 2025학년도 동계 계절학기 안내
//! 이미지 URL: https://...
//! 첨부파일: 안내문.hwp|https://...;신청서.pdf|https://...
//! ========================================
//!
//! 본문...
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// 헤더/본문 구분선 (`=` 40개)
pub const SEPARATOR: &str = "========================================";

/// 제목이 없을 때 기본값
pub const DEFAULT_TITLE: &str = "제목 없음";

const SOURCE_PREFIX: &str = "출처 URL: ";
const TITLE_PREFIX: &str = "제목: ";
const IMAGE_PREFIX: &str = "이미지 URL: ";
const ATTACHMENT_PREFIX: &str = "첨부파일: ";

// ============================================================================
// Types
// ============================================================================

/// 파싱된 공지 파일
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeFile {
    /// 원본 URL (http/https가 아니면 빈 문자열)
    pub source: String,
    /// 제목
    pub title: String,
    /// 본문 이미지 URL 목록 (원문 그대로)
    pub image_urls: Option<String>,
    /// `파일명|URL` 쌍을 `;`로 이은 첨부파일 목록
    pub attachments: Option<String>,
    /// 본문 (OCR 텍스트 포함)
    pub body: String,
}

impl NoticeFile {
    /// 검색용 텍스트 (제목을 본문 앞에 붙임)
    pub fn indexed_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// 공지 파일 텍스트 파싱
///
/// 본문이 비어 있으면 `None`을 반환합니다.
pub fn parse_notice(text: &str) -> Option<NoticeFile> {
    let (header, body) = match text.split_once(SEPARATOR) {
        Some((header, body)) => (header, body.trim()),
        None => ("", text),
    };

    if body.trim().is_empty() {
        return None;
    }

    let mut notice = NoticeFile {
        source: String::new(),
        title: DEFAULT_TITLE.to_string(),
        image_urls: None,
        attachments: None,
        body: body.to_string(),
    };

    for line in header.lines() {
        let line = line.trim_end();

        if let Some(rest) = line.strip_prefix(SOURCE_PREFIX) {
            if let Some(url) = parse_source_url(rest) {
                notice.source = url;
            }
        } else if let Some(rest) = line.strip_prefix(TITLE_PREFIX) {
            if !rest.is_empty() {
                notice.title = rest.to_string();
            }
        } else if let Some(rest) = line.strip_prefix(IMAGE_PREFIX) {
            if !rest.is_empty() {
                notice.image_urls = Some(rest.to_string());
            }
        } else if let Some(rest) = line.strip_prefix(ATTACHMENT_PREFIX) {
            if !rest.is_empty() {
                notice.attachments = Some(rest.to_string());
            }
        }
    }

    Some(notice)
}

/// 출처 URL 검증 (http/https만 허용)
fn parse_source_url(raw: &str) -> Option<String> {
    let candidate = raw.split_whitespace().next()?;
    let parsed = url::Url::parse(candidate).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(candidate.to_string()),
        _ => None,
    }
}

// ============================================================================
// File Collection
// ============================================================================

/// 디렉토리에서 `*.txt` 공지 파일 수집 (재귀, 경로순 정렬)
pub fn collect_notice_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {:?}", dir);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", dir))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_txt = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);
        if is_txt {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// 파일 내용 해시 (SHA-256, hex)
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

// ============================================================================
// Tests
// ============================================================================
