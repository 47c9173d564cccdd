//! 프롬프트 구성

use crate::retrieval::RetrievedDocument;

/// 답변 규칙 (시스템 지시문)
pub const SYSTEM_INSTRUCTION: &str = r#"항공대와 관련된 공식 문서, 공지사항, 학사 일정, 규정 등의 내용을 기반으로 정확하게 답변하세요.

[답변 원칙]
1. 답변은 반드시 제공된 문서와 데이터에 근거해야 합니다.
2. 문서에 없거나 불확실한 내용은 임의로 지어내지 말고, "해당 내용은 문서에서 확인되지 않습니다."라고 말하세요.
3. 학생들이 이해하기 쉽도록 짧고 명확하게 설명하세요.
4. 답변 마지막에 참고한 문서 번호를 [근거: 1, 3] 형태로 붙이세요.
5. 문서 간 내용 충돌이 있을 경우, 최신 문서(번호가 가장 큰 것)를 우선합니다.

[추가 규칙]
- 학사일정, 수업, 시험, 장학금, 등록금 등 학생 관련 질문에 친절하고 정확하게 답합니다.
- 개인 정보, 민감한 조언(법률, 의학 등), 사실이 아닌 내용은 제공하지 않습니다.
- 질문이 모호하면 명확한 답변을 위해 추가 질문을 요청하세요.
- 답변에는 어떤 형태의 URL, 링크, 출처 링크도 포함하지 마세요."#;

/// 문서 목록 → `[Context]` 블록
///
/// 번호는 1부터 시작하며 `[근거: n]`의 n과 같습니다.
pub fn build_context(docs: &[RetrievedDocument]) -> String {
    let mut context = String::new();

    for (i, doc) in docs.iter().enumerate() {
        context.push_str(&format!("--- 문서 {} ---\n", i + 1));
        context.push_str(&format!("제목: {}\n", doc.title().unwrap_or("")));
        context.push_str(&format!("출처: {}\n", doc.source()));
        context.push_str(doc.raw_content());
        context.push_str("\n\n");
    }

    context
}

/// 최종 프롬프트
pub fn build_prompt(question: &str, docs: &[RetrievedDocument]) -> String {
    format!(
        "{}\n\n[Context]\n{}\n\n[질문]\n{}\n\n[답변]",
        SYSTEM_INSTRUCTION,
        build_context(docs),
        question
    )
}
