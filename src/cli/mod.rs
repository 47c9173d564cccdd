//! CLI 모듈
//!
//! kau-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::answer::{GeminiGenerator, RagPipeline};
use crate::config::{get_data_dir, Settings};
use crate::embedding::{EmbeddingProvider, GeminiEmbedding};
use crate::gemini::{has_api_key, GeminiClient};
use crate::knowledge::{
    recursive_chunker, ChunkConfig, LanceVectorStore, NoticeIndexer, NoticeStore, VectorStore,
    KNOWLEDGE_DB_FILE, VECTOR_DIR,
};
use crate::retrieval::{EnsembleRetriever, LexicalRetriever, Retriever, VectorRetriever};

/// API 키 안내 문구
const API_KEY_HELP: &str = "API 키가 설정되지 않았습니다.\n\n\
     설정 방법:\n  \
     export GEMINI_API_KEY=your-api-key\n  \
     또는\n  \
     export GOOGLE_API_KEY=your-api-key\n\n\
     API 키 발급: https://aistudio.google.com/app/apikey";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "kau-rag")]
#[command(version, about = "한국항공대 공지사항 RAG 챗봇", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: ~/.kau-rag 또는 KAU_RAG_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 공지 텍스트 폴더를 색인
    Index {
        /// 공지 파일 폴더 (재귀)
        #[arg(short, long)]
        dir: PathBuf,

        /// 변경되지 않은 공지도 다시 색인
        #[arg(long)]
        force: bool,
    },

    /// 하이브리드 검색 결과 확인
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 질문 한 번에 답변
    Ask {
        /// 질문
        question: String,

        /// 근거 문서 수
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 대화형 질의응답 (/exit 또는 EOF로 종료)
    Chat {
        /// 근거 문서 수
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.unwrap_or_else(get_data_dir);

    match cli.command {
        Commands::Index { dir, force } => cmd_index(&data_dir, &dir, force).await,
        Commands::Search { query, k } => cmd_search(&data_dir, &query, k).await,
        Commands::Ask { question, k } => cmd_ask(&data_dir, &question, k).await,
        Commands::Chat { k } => cmd_chat(&data_dir, k).await,
        Commands::Status => cmd_status(&data_dir).await,
    }
}

// ============================================================================
// Workspace
// ============================================================================

/// 데이터 디렉토리의 저장소와 설정
struct Workspace {
    data_dir: PathBuf,
    settings: Settings,
    store: Arc<NoticeStore>,
}

impl Workspace {
    fn open(data_dir: &Path) -> Result<Self> {
        let settings = Settings::load(data_dir)?;
        let store = NoticeStore::open(&data_dir.join(KNOWLEDGE_DB_FILE))
            .context("NoticeStore 열기 실패")?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            settings,
            store: Arc::new(store),
        })
    }

    async fn vectors(&self) -> Result<Arc<LanceVectorStore>> {
        let vectors =
            LanceVectorStore::open(&self.data_dir.join(VECTOR_DIR), self.settings.embedding_dimension)
                .await
                .context("LanceDB 열기 실패")?;
        Ok(Arc::new(vectors))
    }

    fn embedder(&self, client: GeminiClient) -> Result<Arc<GeminiEmbedding>> {
        Ok(Arc::new(GeminiEmbedding::new(
            client,
            self.settings.embedding_dimension,
        )?))
    }

    /// 키워드 + 벡터 앙상블
    ///
    /// API 키가 없거나 벡터 인덱스를 열 수 없으면 키워드 검색기만 사용합니다.
    async fn ensemble(&self, client: Option<GeminiClient>, k: usize) -> Result<EnsembleRetriever> {
        let lexical: Arc<dyn Retriever> =
            Arc::new(LexicalRetriever::new(self.store.clone()).with_limit(self.settings.fetch_k));
        let ensemble =
            EnsembleRetriever::new(k).with_retriever(lexical, self.settings.lexical_weight);

        let Some(client) = client else {
            tracing::warn!("No API key, vector retriever disabled");
            return Ok(ensemble);
        };

        match self.vector_retriever(client).await {
            Ok(vector) => Ok(ensemble.with_retriever(vector, self.settings.vector_weight)),
            Err(e) => {
                tracing::warn!("Vector retriever unavailable, using FTS5 only: {:#}", e);
                Ok(ensemble)
            }
        }
    }

    async fn vector_retriever(&self, client: GeminiClient) -> Result<Arc<dyn Retriever>> {
        let embedder = self.embedder(client)?;
        let vectors = self.vectors().await?;
        Ok(Arc::new(
            VectorRetriever::new(self.store.clone(), vectors, embedder).with_limit(self.settings.fetch_k),
        ))
    }

    /// 질의응답 파이프라인 (색인이 비어 있으면 unloaded)
    async fn pipeline(&self, k: Option<usize>) -> Result<RagPipeline> {
        if !has_api_key() {
            bail!(API_KEY_HELP);
        }

        let client = GeminiClient::from_env()?;
        let generator = Arc::new(GeminiGenerator::new(
            client.clone(),
            self.settings.generation_model.clone(),
        ));

        if self.store.stats()?.chunk_count == 0 {
            tracing::warn!("Knowledge base is empty: {:?}", self.data_dir);
            return Ok(RagPipeline::unloaded(generator));
        }

        let k = k.unwrap_or(self.settings.top_k);
        let ensemble = self.ensemble(Some(client), k).await?;
        Ok(RagPipeline::new(ensemble, generator))
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 색인 명령어 (index)
///
/// 공지 파일을 읽어 SQLite와 LanceDB에 저장합니다.
async fn cmd_index(data_dir: &Path, dir: &Path, force: bool) -> Result<()> {
    if !has_api_key() {
        bail!(API_KEY_HELP);
    }
    if !dir.is_dir() {
        bail!("폴더를 찾을 수 없습니다: {}", dir.display());
    }

    let workspace = Workspace::open(data_dir)?;
    let client = GeminiClient::from_env()?;
    let embedder: Arc<dyn EmbeddingProvider> = workspace.embedder(client)?;
    let vectors: Arc<dyn VectorStore> = workspace.vectors().await?;

    let indexer = NoticeIndexer::new(
        workspace.store.clone(),
        vectors,
        embedder,
        recursive_chunker(ChunkConfig::from_settings(&workspace.settings)),
    );

    println!("[*] 색인 중: {}", dir.display());
    let report = indexer.index_dir(dir, force).await?;

    println!();
    println!("[OK] 완료: {} 파일", report.total());
    println!(
        "     신규 {}, 갱신 {}, 변경 없음 {}, 빈 공지 {}, 실패 {}",
        report.indexed, report.reindexed, report.unchanged, report.empty, report.failed
    );
    println!("     저장된 청크: {}", report.chunks);

    Ok(())
}

/// 검색 명령어 (search)
///
/// 융합 점수와 함께 검색 결과를 보여줍니다.
async fn cmd_search(data_dir: &Path, query: &str, k: Option<usize>) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let client = if has_api_key() {
        Some(GeminiClient::from_env()?)
    } else {
        println!("[!] API 키 미설정: 키워드 검색만 사용합니다.");
        None
    };

    let k = k.unwrap_or(workspace.settings.top_k);
    let ensemble = workspace.ensemble(client, k).await?;

    println!("[*] 검색 중: \"{}\"", query);
    let results = ensemble.invoke_scored(query).await;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        let doc = &result.document;
        println!(
            "{}. [점수: {:.2}] [{}]",
            i + 1,
            result.score,
            result.matched_by.join("+")
        );
        println!("   제목: {}", doc.title().unwrap_or("-"));
        if !doc.source().is_empty() {
            println!("   URL: {}", doc.source());
        }
        println!("   내용: {}", truncate_text(&doc.content, 200));
        println!();
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(data_dir: &Path, question: &str, k: Option<usize>) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let pipeline = workspace.pipeline(k).await?;

    let answer = pipeline.respond(question).await;
    println!("{}", answer);

    Ok(())
}

/// 대화 명령어 (chat)
///
/// 한 줄에 질문 하나씩 받습니다. 대화 기록은 저장하지 않습니다.
async fn cmd_chat(data_dir: &Path, k: Option<usize>) -> Result<()> {
    let workspace = Workspace::open(data_dir)?;
    let pipeline = workspace.pipeline(k).await?;

    println!("KAU 공지사항 챗봇 (종료: /exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all("\n질문> ".as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/exit" || question == "/quit" {
            break;
        }

        let answer = pipeline.respond(question).await;
        println!("\n{}", answer);
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
async fn cmd_status(data_dir: &Path) -> Result<()> {
    println!("kau-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    let workspace = match Workspace::open(data_dir) {
        Ok(workspace) => workspace,
        Err(e) => {
            println!("[!] 저장소 열기 실패: {:#}", e);
            return Ok(());
        }
    };

    let settings = &workspace.settings;
    println!(
        "[*] 설정: 가중치 {}/{}, k={}, 모델 {}",
        settings.lexical_weight, settings.vector_weight, settings.top_k, settings.generation_model
    );

    match workspace.store.stats() {
        Ok(stats) => {
            println!("[OK] 저장된 공지: {} 건", stats.notice_count);
            println!("     청크: {} 개", stats.chunk_count);
            println!("     총 본문: {}", format_bytes(stats.total_content_bytes));
        }
        Err(e) => println!("[!] 통계 조회 실패: {}", e),
    }

    if !workspace.store.fts_enabled() {
        println!("[!] FTS5 사용 불가: LIKE 검색으로 대체됩니다.");
    }

    match workspace.vectors().await {
        Ok(vectors) => match vectors.count().await {
            Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
            Err(e) => tracing::debug!("벡터 통계 조회 실패: {}", e),
        },
        Err(e) => tracing::debug!("LanceDB 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("공지", 10), "공지");
        assert_eq!(truncate_text("수강신청 정정 기간", 4), "수강신청...");
        assert_eq!(truncate_text("제목\n본문", 20), "제목 본문");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["kau-rag", "ask", "휴학 신청 기간", "-k", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { ref question, k: Some(3) } if question == "휴학 신청 기간"));

        let cli = Cli::try_parse_from(["kau-rag", "index", "--dir", "notices", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Index { force: true, .. }));

        let cli = Cli::try_parse_from(["kau-rag", "status", "--data-dir", "/tmp/kau"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/kau")));
    }

    #[tokio::test]
    async fn test_ensemble_falls_back_to_keywords() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"embedding_dimension": 999}"#).unwrap();

        let workspace = Workspace::open(dir.path()).unwrap();
        let client = GeminiClient::new("fake_key".to_string()).unwrap();

        let ensemble = workspace.ensemble(Some(client), 3).await.unwrap();
        assert_eq!(ensemble.len(), 1);
        assert_eq!(ensemble.k(), 3);

        let ensemble = workspace.ensemble(None, 3).await.unwrap();
        assert_eq!(ensemble.len(), 1);
    }

    #[tokio::test]
    async fn test_status_on_empty_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        cmd_status(dir.path()).await.unwrap();
        assert!(dir.path().join(KNOWLEDGE_DB_FILE).exists());
    }
}
