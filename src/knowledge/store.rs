//! Notice Store - rusqlite 기반 공지/청크 저장소
//!
//! 공지 메타데이터와 청크 텍스트를 저장하고 FTS5 키워드 검색을 제공합니다.
//! 저장 위치: ~/.kau-rag/knowledge.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;

/// 청크 조회 공통 SELECT
const CHUNK_SELECT: &str = "SELECT c.id, c.notice_id, c.content, n.title, n.source,
        n.raw_content, n.attachments, n.image_urls
     FROM chunks c
     JOIN notices n ON n.id = c.notice_id";

// ============================================================================
// Types
// ============================================================================

/// 새 공지 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewNotice {
    /// 파일 식별자 (공지 파일 경로)
    pub file_key: String,
    pub source: String,
    pub title: String,
    /// 전체 본문
    pub raw_content: String,
    pub attachments: Option<String>,
    pub image_urls: Option<String>,
    /// 원본 파일 SHA-256
    pub content_hash: String,
}

/// 저장된 공지
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub id: i64,
    pub file_key: String,
    pub source: String,
    pub title: String,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
}

/// 청크 + 공지 메타데이터
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub chunk_id: i64,
    pub notice_id: i64,
    pub content: String,
    pub title: String,
    pub source: String,
    pub raw_content: String,
    pub attachments: Option<String>,
    pub image_urls: Option<String>,
}

/// FTS5 검색 결과
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub record: ChunkRecord,
    /// bm25() 값 (낮을수록 관련도 높음)
    pub bm25_score: f64,
}

/// 공지 저장 결과
#[derive(Debug, Clone)]
pub struct StoredNotice {
    pub notice_id: i64,
    /// 삽입 순서대로의 청크 ID
    pub chunk_ids: Vec<i64>,
    /// 기존 공지를 교체했는지 여부
    pub replaced: bool,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub notice_count: usize,
    pub chunk_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// NoticeStore
// ============================================================================

/// Notice Store - 동기 저장소
///
/// 검색 시에는 읽기만 하므로 여러 검색기가 `Arc`로 공유합니다.
pub struct NoticeStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    fts_enabled: bool,
}

impl NoticeStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let fts_enabled = initialize(&conn)?;
        tracing::debug!("Notice store initialized at {:?} (fts5={})", path, fts_enabled);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
            fts_enabled,
        })
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// FTS5 사용 가능 여부
    pub fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 파일 키로 공지 조회
    pub fn get_notice(&self, file_key: &str) -> Result<Option<Notice>> {
        let conn = self.lock()?;

        let notice = conn
            .query_row(
                "SELECT id, file_key, source, title, content_hash, indexed_at
                 FROM notices WHERE file_key = ?1",
                params![file_key],
                |row| {
                    Ok(Notice {
                        id: row.get(0)?,
                        file_key: row.get(1)?,
                        source: row.get(2)?,
                        title: row.get(3)?,
                        content_hash: row.get(4)?,
                        indexed_at: parse_datetime(row.get::<_, String>(5)?),
                    })
                },
            )
            .optional()
            .context("Failed to query notice")?;

        Ok(notice)
    }

    /// 공지와 청크 저장 (같은 파일 키가 있으면 청크까지 교체)
    pub fn upsert_notice(&self, notice: &NewNotice, chunks: &[String]) -> Result<StoredNotice> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let now = Utc::now().to_rfc3339();

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM notices WHERE file_key = ?1",
                params![notice.file_key],
                |row| row.get(0),
            )
            .optional()?;

        let notice_id = match existing {
            Some(id) => {
                tx.execute("DELETE FROM chunks WHERE notice_id = ?1", params![id])
                    .context("Failed to delete old chunks")?;
                tx.execute(
                    "UPDATE notices
                     SET source = ?2, title = ?3, raw_content = ?4, attachments = ?5,
                         image_urls = ?6, content_hash = ?7, indexed_at = ?8
                     WHERE id = ?1",
                    params![
                        id,
                        notice.source,
                        notice.title,
                        notice.raw_content,
                        notice.attachments,
                        notice.image_urls,
                        notice.content_hash,
                        now
                    ],
                )
                .context("Failed to update notice")?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO notices
                     (file_key, source, title, raw_content, attachments, image_urls, content_hash, indexed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        notice.file_key,
                        notice.source,
                        notice.title,
                        notice.raw_content,
                        notice.attachments,
                        notice.image_urls,
                        notice.content_hash,
                        now
                    ],
                )
                .context("Failed to insert notice")?;
                tx.last_insert_rowid()
            }
        };

        let mut chunk_ids = Vec::with_capacity(chunks.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (notice_id, chunk_index, content) VALUES (?1, ?2, ?3)",
            )?;
            for (i, chunk) in chunks.iter().enumerate() {
                stmt.execute(params![notice_id, i as i64, chunk])
                    .context("Failed to insert chunk")?;
                chunk_ids.push(tx.last_insert_rowid());
            }
        }

        tx.commit().context("Failed to commit notice")?;

        tracing::debug!(
            "Stored notice {} (id={}, chunks={})",
            notice.file_key,
            notice_id,
            chunk_ids.len()
        );

        Ok(StoredNotice {
            notice_id,
            chunk_ids,
            replaced: existing.is_some(),
        })
    }

    /// 색인 완료 표시 (벡터까지 저장한 뒤 호출)
    pub fn set_content_hash(&self, notice_id: i64, content_hash: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notices SET content_hash = ?2 WHERE id = ?1",
            params![notice_id, content_hash],
        )
        .context("Failed to update content hash")?;
        Ok(())
    }

    /// 공지 삭제 (청크 포함)
    pub fn delete_notice(&self, notice_id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chunks WHERE notice_id = ?1", params![notice_id])?;
        let rows = tx.execute("DELETE FROM notices WHERE id = ?1", params![notice_id])?;
        tx.commit()?;

        Ok(rows > 0)
    }

    /// 청크 ID로 조회
    pub fn get_chunk(&self, chunk_id: i64) -> Result<Option<ChunkRecord>> {
        let conn = self.lock()?;

        let sql = format!("{} WHERE c.id = ?1", CHUNK_SELECT);
        let record = conn
            .query_row(&sql, params![chunk_id], chunk_from_row)
            .optional()
            .context("Failed to query chunk")?;

        Ok(record)
    }

    /// FTS5 키워드 검색
    ///
    /// BM25 스코어 순으로 정렬된 청크를 반환합니다.
    /// source: https://www.sqlite.org/fts5.html#the_bm25_function
    pub fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<FtsHit>> {
        if !self.fts_enabled {
            anyhow::bail!("FTS5 is not available");
        }

        let match_query = build_fts5_query(query);
        if match_query.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.notice_id, c.content, n.title, n.source,
                   n.raw_content, n.attachments, n.image_urls,
                   bm25(chunks_fts) AS score
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.rowid
            JOIN notices n ON n.id = c.notice_id
            WHERE chunks_fts MATCH ?1
            ORDER BY score, c.id
            LIMIT ?2
            "#,
        )?;

        let hits = stmt
            .query_map(params![match_query, limit as i64], |row| {
                Ok(FtsHit {
                    record: chunk_from_row(row)?,
                    bm25_score: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read FTS5 results")?;

        Ok(hits)
    }

    /// 간단한 LIKE 검색 (FTS5 사용 불가 시 폴백)
    ///
    /// 질의 단어가 많이 포함된 청크일수록 앞에 옵니다.
    pub fn search_like(&self, query: &str, limit: usize) -> Result<Vec<ChunkRecord>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.lock()?;

        let score_expr = (1..=terms.len())
            .map(|i| format!("(LOWER(c.content) LIKE ?{})", i))
            .collect::<Vec<_>>()
            .join(" + ");
        let sql = format!(
            "{} WHERE ({}) > 0 ORDER BY ({}) DESC, c.id LIMIT {}",
            CHUNK_SELECT, score_expr, score_expr, limit
        );

        let patterns: Vec<String> = terms
            .iter()
            .map(|t| format!("%{}%", t.to_lowercase()))
            .collect();

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(patterns.iter()), chunk_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read LIKE results")?;

        Ok(records)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let notice_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM notices", [], |row| row.get(0))?;
        let chunk_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(raw_content AS BLOB))), 0) FROM notices",
            [],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            notice_count: notice_count as usize,
            chunk_count: chunk_count as usize,
            total_content_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Schema
// ============================================================================

/// 스키마 초기화, FTS5 사용 가능 여부 반환
fn initialize(conn: &Connection) -> Result<bool> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_key TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL,
            raw_content TEXT NOT NULL,
            attachments TEXT,
            image_urls TEXT,
            content_hash TEXT NOT NULL,
            indexed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            notice_id INTEGER NOT NULL REFERENCES notices(id),
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_notice ON chunks(notice_id);",
    )
    .context("Failed to create tables")?;

    // FTS5 가상 테이블 (키워드 검색용)
    // source: https://www.sqlite.org/fts5.html
    let fts_result = conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
            content,
            content=chunks,
            content_rowid=id
        )",
        [],
    );

    if let Err(e) = fts_result {
        tracing::warn!("FTS5 not available, falling back to LIKE search: {}", e);
        return Ok(false);
    }

    conn.execute_batch(
        r#"
        CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
            INSERT INTO chunks_fts(rowid, content) VALUES (new.id, new.content);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, content)
            VALUES('delete', old.id, old.content);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, content)
            VALUES('delete', old.id, old.content);
            INSERT INTO chunks_fts(rowid, content) VALUES (new.id, new.content);
        END;
        "#,
    )
    .context("Failed to create FTS5 triggers")?;

    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        chunk_id: row.get(0)?,
        notice_id: row.get(1)?,
        content: row.get(2)?,
        title: row.get(3)?,
        source: row.get(4)?,
        raw_content: row.get(5)?,
        attachments: row.get(6)?,
        image_urls: row.get(7)?,
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// 질의에서 검색어 추출 (특수 문자 제거)
fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// FTS5 MATCH 질의 생성
///
/// 각 단어를 따옴표로 감싸 접두어 검색하고 OR로 잇습니다.
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn build_fts5_query(query: &str) -> String {
    query_terms(query)
        .iter()
        .map(|t| format!("\"{}\"*", t))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================
