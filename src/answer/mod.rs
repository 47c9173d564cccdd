//! Answer 모듈 - 검색 → 프롬프트 → 생성 → 근거 정리
//!
//! `RagPipeline::respond`는 실패하지 않습니다. 색인이 없거나 생성이 실패해도
//! 사용자에게 보여줄 문장을 반환합니다.

mod citation;
mod generator;
mod prompt;

use std::sync::Arc;

pub use citation::{parse_attachments, reconcile, Reconciled, FOOTER_HEADER};
pub use generator::{AnswerGenerator, GeminiGenerator, GenerationError, DEFAULT_GENERATION_MODEL};
pub use prompt::{build_context, build_prompt, SYSTEM_INSTRUCTION};

use crate::retrieval::{dedup_by_source_title, EnsembleRetriever, RetrievedDocument};

/// 색인이 로드되지 않았을 때의 응답
pub const NOT_LOADED_MESSAGE: &str = "죄송합니다. 데이터베이스가 로드되지 않았습니다.";

/// 생성 실패 응답 접두어
pub const GENERATION_ERROR_PREFIX: &str = "AI 응답 생성 중 오류가 발생했습니다";

/// 질의 응답 파이프라인
pub struct RagPipeline {
    ensemble: Option<EnsembleRetriever>,
    generator: Arc<dyn AnswerGenerator>,
}

impl RagPipeline {
    pub fn new(ensemble: EnsembleRetriever, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            ensemble: Some(ensemble),
            generator,
        }
    }

    /// 색인 없이 생성 (모든 질문에 안내 문구로 응답)
    pub fn unloaded(generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            ensemble: None,
            generator,
        }
    }

    /// 검색기가 하나 이상 있는지
    pub fn is_loaded(&self) -> bool {
        self.ensemble.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// 융합 + 중복 제거된 근거 문서
    pub async fn search(&self, question: &str) -> Vec<RetrievedDocument> {
        match &self.ensemble {
            Some(ensemble) => {
                let docs = dedup_by_source_title(ensemble.invoke(question).await);
                tracing::info!("Retrieved {} documents (k={})", docs.len(), ensemble.k());
                docs
            }
            None => Vec::new(),
        }
    }

    /// 질문에 대한 최종 답변 (출처 목록 포함)
    pub async fn respond(&self, question: &str) -> String {
        if !self.is_loaded() {
            return NOT_LOADED_MESSAGE.to_string();
        }

        let docs = self.search(question).await;

        let prompt = build_prompt(question, &docs);
        let answer = match self.generator.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Generation failed with {}: {}", self.generator.model(), e);
                return format!("{}: {}", GENERATION_ERROR_PREFIX, e);
            }
        };

        reconcile(&answer, &docs).render()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GeminiError;
    use crate::retrieval::{Retriever, META_ATTACHMENTS, META_SOURCE, META_TITLE};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 정해진 답변을 돌려주고 받은 프롬프트를 기록
    struct ScriptedGenerator {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl AnswerGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(GeminiError::Api {
                    status: "UNAVAILABLE".to_string(),
                    message: message.clone(),
                }
                .into()),
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    struct StaticRetriever(Vec<RetrievedDocument>);

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>> {
            anyhow::bail!("offline")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn doc(content: &str, title: &str, source: &str) -> RetrievedDocument {
        RetrievedDocument::new(content)
            .with_meta(META_TITLE, title)
            .with_meta(META_SOURCE, source)
    }

    fn ensemble(lexical: Vec<RetrievedDocument>, vector: Vec<RetrievedDocument>) -> EnsembleRetriever {
        EnsembleRetriever::new(5)
            .with_retriever(Arc::new(StaticRetriever(lexical)), 0.3)
            .with_retriever(Arc::new(StaticRetriever(vector)), 0.7)
    }

    #[tokio::test]
    async fn test_unloaded_pipeline_apologizes() {
        let generator = ScriptedGenerator::ok("쓰이지 않음");
        let pipeline = RagPipeline::unloaded(generator.clone());

        assert!(!pipeline.is_loaded());
        assert_eq!(pipeline.respond("질문").await, NOT_LOADED_MESSAGE);
        assert!(pipeline.search("질문").await.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensemble_without_retrievers_is_not_loaded() {
        let pipeline = RagPipeline::new(EnsembleRetriever::new(5), ScriptedGenerator::ok("x"));
        assert!(!pipeline.is_loaded());
        assert_eq!(pipeline.respond("질문").await, NOT_LOADED_MESSAGE);
    }

    #[tokio::test]
    async fn test_answer_with_footer() {
        let generator = ScriptedGenerator::ok("6월에 신청합니다. [근거: 1]");
        let pipeline = RagPipeline::new(
            ensemble(
                vec![],
                vec![doc("장학금 청크", "장학금 안내", "https://kau.ac.kr/s")
                    .with_meta(META_ATTACHMENTS, "신청서.hwp|https://kau.ac.kr/f")],
            ),
            generator.clone(),
        );

        let answer = pipeline.respond("장학금 언제?").await;
        assert_eq!(
            answer,
            "6월에 신청합니다.\n\n---\n**참고한 출처:**\n- [장학금 안내](https://kau.ac.kr/s)\n- 📁 [신청서.hwp](https://kau.ac.kr/f)"
        );

        let prompt = generator.last_prompt();
        assert!(prompt.contains("--- 문서 1 ---\n제목: 장학금 안내"));
        assert!(prompt.contains("[질문]\n장학금 언제?"));
    }

    #[tokio::test]
    async fn test_context_numbered_after_dedup() {
        // 같은 공지의 두 청크 → 문서 하나로 합쳐져 번호가 밀리지 않음
        let generator = ScriptedGenerator::ok("답 [근거: 2]");
        let pipeline = RagPipeline::new(
            ensemble(
                vec![doc("청크 2", "A", "https://a"), doc("청크 B", "B", "https://b")],
                vec![doc("청크 1", "A", "https://a")],
            ),
            generator.clone(),
        );

        let docs = pipeline.search("q").await;
        let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["청크 1", "청크 B"]);

        let answer = pipeline.respond("q").await;
        assert!(answer.ends_with("- [B](https://b)"));
        assert!(!generator.last_prompt().contains("--- 문서 3 ---"));
    }

    #[tokio::test]
    async fn test_generator_failure_message() {
        let pipeline = RagPipeline::new(
            ensemble(vec![doc("x", "A", "https://a")], vec![]),
            ScriptedGenerator::failing("overloaded"),
        );

        let answer = pipeline.respond("q").await;
        assert!(answer.starts_with("AI 응답 생성 중 오류가 발생했습니다: "));
        assert!(answer.contains("overloaded"));
    }

    #[tokio::test]
    async fn test_all_retrievers_failing_still_answers() {
        let generator = ScriptedGenerator::ok("해당 내용은 문서에서 확인되지 않습니다. [근거: 1]");
        let pipeline = RagPipeline::new(
            EnsembleRetriever::new(5)
                .with_retriever(Arc::new(FailingRetriever), 0.3)
                .with_retriever(Arc::new(FailingRetriever), 0.7),
            generator.clone(),
        );

        let answer = pipeline.respond("q").await;
        assert_eq!(answer, "해당 내용은 문서에서 확인되지 않습니다.");
        assert!(generator.last_prompt().contains("[Context]\n\n\n[질문]"));
    }
}
