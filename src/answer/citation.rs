//! 근거 표기 정리 - `[근거: 1, 3]` 마커 → 참고 출처 목록
//!
//! 모델은 답변 끝에 참고한 문서 번호(1부터)를 `[근거: n, ...]` 형태로 붙입니다.
//! 사용자에게는 마커를 숨기고, 번호가 가리키는 문서의 링크와 첨부파일을
//! 답변 아래에 목록으로 보여줍니다.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::knowledge::DEFAULT_TITLE;
use crate::retrieval::RetrievedDocument;

/// 출처 블록 머리말
pub const FOOTER_HEADER: &str = "\n\n---\n**참고한 출처:**\n";

/// 숫자 목록이 들어 있는 마커 (번호 추출용)
fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[근거\s*:\s*([\d,\s]+)\]").expect("Invalid regex"))
}

/// 내용과 무관한 모든 마커 (제거용)
fn any_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[근거\s*:[^\]]*\]").expect("Invalid regex"))
}

// ============================================================================
// Types
// ============================================================================

/// 정리된 답변
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// 마커가 제거된 답변
    pub text: String,
    /// 출처 줄 (중복 없음, 첫 등장 순)
    pub footer: Vec<String>,
}

impl Reconciled {
    /// 사용자에게 보여줄 최종 텍스트
    pub fn render(&self) -> String {
        if self.footer.is_empty() {
            return self.text.clone();
        }
        format!("{}{}{}", self.text, FOOTER_HEADER, self.footer.join("\n"))
    }
}

// ============================================================================
// Reconcile
// ============================================================================

/// 답변의 근거 마커를 출처 목록으로 바꿉니다.
///
/// 범위를 벗어난 번호, 숫자가 아닌 토큰, 이미 처리한 번호는 조용히 무시합니다.
pub fn reconcile(answer: &str, cited: &[RetrievedDocument]) -> Reconciled {
    let numbers = extract_numbers(answer);
    let text = strip_markers(answer);

    let mut footer: Vec<String> = Vec::new();
    let mut seen_lines: HashSet<String> = HashSet::new();
    let mut push = |line: String| {
        if seen_lines.insert(line.clone()) {
            footer.push(line);
        }
    };

    let mut processed: HashSet<usize> = HashSet::new();
    for num in numbers {
        if !processed.insert(num) {
            continue;
        }

        let Some(doc) = num.checked_sub(1).and_then(|i| cited.get(i)) else {
            tracing::debug!("Ignoring out-of-range evidence number {}", num);
            continue;
        };

        for line in footer_lines(doc) {
            push(line);
        }
    }

    Reconciled { text, footer }
}

/// 모든 마커의 번호를 등장 순서대로 추출
///
/// 토큰은 쉼표와 공백 어느 쪽으로도 구분됩니다.
fn extract_numbers(answer: &str) -> Vec<usize> {
    marker_regex()
        .captures_iter(answer)
        .filter_map(|caps| caps.get(1))
        .flat_map(|m| {
            m.as_str()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .filter_map(|t| t.parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// 마커 제거 후 앞뒤 공백 정리
fn strip_markers(answer: &str) -> String {
    let re = any_marker_regex();
    let mut text = re.replace_all(answer, "").into_owned();
    // 제거 후 이어 붙은 조각이 다시 마커가 되는 경우
    while re.is_match(&text) {
        text = re.replace_all(&text, "").into_owned();
    }
    text.trim().to_string()
}

/// 문서 하나의 출처 줄 (링크 + 첨부파일)
fn footer_lines(doc: &RetrievedDocument) -> Vec<String> {
    let mut lines = Vec::new();

    // 링크는 출처가 있을 때만, 첨부파일은 출처와 무관하게
    let source = doc.source();
    if !source.is_empty() {
        let title = doc
            .title()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE);
        lines.push(format!("- [{}]({})", title, source));
    }

    if let Some(raw) = doc.attachments() {
        lines.extend(
            parse_attachments(raw)
                .into_iter()
                .map(|(name, url)| format!("- 📁 [{}]({})", name, url)),
        );
    }

    lines
}

/// `파일명|URL;파일명|URL` 파싱
///
/// `|`로 나눈 두 부분이 모두 비어 있지 않은 항목만 남깁니다.
pub fn parse_attachments(raw: &str) -> Vec<(&str, &str)> {
    raw.split(';')
        .filter_map(|item| {
            let (name, url) = item.split_once('|')?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() || url.contains('|') {
                return None;
            }
            Some((name, url))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{META_ATTACHMENTS, META_SOURCE, META_TITLE};

    fn doc(title: &str, source: &str) -> RetrievedDocument {
        RetrievedDocument::new(format!("{} 내용", title))
            .with_meta(META_TITLE, title)
            .with_meta(META_SOURCE, source)
    }

    #[test]
    fn test_two_cited_documents() {
        let cited = vec![doc("장학금", "https://kau.ac.kr/1"), doc("기숙사", "https://kau.ac.kr/2")];

        let result = reconcile("답변입니다 [근거: 1, 2]", &cited);
        assert_eq!(result.text, "답변입니다");
        assert_eq!(
            result.footer,
            vec!["- [장학금](https://kau.ac.kr/1)", "- [기숙사](https://kau.ac.kr/2)"]
        );
        assert_eq!(
            result.render(),
            "답변입니다\n\n---\n**참고한 출처:**\n- [장학금](https://kau.ac.kr/1)\n- [기숙사](https://kau.ac.kr/2)"
        );
    }

    #[test]
    fn test_out_of_range_yields_no_footer() {
        let cited = vec![doc("A", "https://a"), doc("B", "https://b")];

        let result = reconcile("답변 [근거: 5]", &cited);
        assert_eq!(result.text, "답변");
        assert!(result.footer.is_empty());
        assert_eq!(result.render(), "답변");
    }

    #[test]
    fn test_zero_is_out_of_range() {
        let cited = vec![doc("A", "https://a")];
        assert!(reconcile("x [근거: 0]", &cited).footer.is_empty());
    }

    #[test]
    fn test_repeated_number_cited_once() {
        let cited = vec![doc("A", "https://a"), doc("B", "https://b")];

        let result = reconcile("첫 문장 [근거: 1] 둘째 문장 [근거: 1, 2, 1]", &cited);
        assert_eq!(result.footer, vec!["- [A](https://a)", "- [B](https://b)"]);
    }

    #[test]
    fn test_markers_collected_across_occurrences_in_order() {
        let cited = vec![doc("A", "https://a"), doc("B", "https://b"), doc("C", "https://c")];

        let result = reconcile("[근거: 3] 중간 [근거:1]", &cited);
        assert_eq!(result.text, "중간");
        assert_eq!(result.footer, vec!["- [C](https://c)", "- [A](https://a)"]);
    }

    #[test]
    fn test_whitespace_separated_tokens() {
        let cited = vec![doc("A", "https://a"), doc("B", "https://b")];
        let result = reconcile("답 [근거: 1 2]", &cited);
        assert_eq!(result.footer.len(), 2);
    }

    #[test]
    fn test_malformed_markers_removed_without_citation() {
        let cited = vec![doc("A", "https://a")];

        let result = reconcile("답변 [근거: 일번] 끝 [근거 : ] [근거:1a]", &cited);
        assert!(!result.text.contains("[근거"));
        assert!(result.footer.is_empty());
    }

    #[test]
    fn test_no_raw_marker_remains() {
        let answers = [
            "a [근거: 1]",
            "[근거:1,2,3]b",
            "c [근거 : 2] d [근거: x]",
            "[근[근거: 1]거: 2]",
            "없음",
        ];
        let cited = vec![doc("A", "https://a")];

        for answer in answers {
            let result = reconcile(answer, &cited);
            assert!(!result.text.contains("[근거"), "marker left in {:?}", result.text);
            assert!(!result.render().contains("[근거"));
        }
    }

    #[test]
    fn test_footer_only_references_cited_documents() {
        let cited = vec![doc("A", "https://a"), doc("B", "https://b")];
        let result = reconcile("답 [근거: 2, 7, 9]", &cited);

        assert_eq!(result.footer, vec!["- [B](https://b)"]);
        for line in &result.footer {
            assert!(cited.iter().any(|d| line.contains(d.source())));
        }
    }

    #[test]
    fn test_document_without_source_skipped() {
        let cited = vec![RetrievedDocument::new("x").with_meta(META_TITLE, "제목")];
        assert!(reconcile("답 [근거: 1]", &cited).footer.is_empty());
    }

    #[test]
    fn test_attachments_listed_without_source() {
        let cited = vec![RetrievedDocument::new("x")
            .with_meta(META_TITLE, "안내")
            .with_meta(META_ATTACHMENTS, "안내.hwp|https://kau.ac.kr/f/1")];

        let result = reconcile("답 [근거: 1]", &cited);
        assert_eq!(result.footer, vec!["- 📁 [안내.hwp](https://kau.ac.kr/f/1)"]);
        assert!(result.render().ends_with("**참고한 출처:**\n- 📁 [안내.hwp](https://kau.ac.kr/f/1)"));
    }

    #[test]
    fn test_first_out_of_range_number_ignored() {
        let cited = vec![doc("A", "https://a"), doc("B", "https://b")];

        assert!(reconcile("답 [근거: 3]", &cited).footer.is_empty());
        assert_eq!(
            reconcile("답 [근거: 2, 3]", &cited).footer,
            vec!["- [B](https://b)"]
        );
    }

    #[test]
    fn test_missing_title_uses_default() {
        let cited = vec![RetrievedDocument::new("x").with_meta(META_SOURCE, "https://a")];
        let result = reconcile("답 [근거: 1]", &cited);
        assert_eq!(result.footer, vec!["- [제목 없음](https://a)"]);

        let cited = vec![doc("", "https://a")];
        assert_eq!(reconcile("답 [근거: 1]", &cited).footer, vec!["- [제목 없음](https://a)"]);
    }

    #[test]
    fn test_attachments_listed_after_link() {
        let cited = vec![doc("계절학기", "https://kau.ac.kr/9").with_meta(
            META_ATTACHMENTS,
            "안내문.hwp|https://kau.ac.kr/f/1;신청서.pdf|https://kau.ac.kr/f/2",
        )];

        let result = reconcile("답 [근거: 1]", &cited);
        assert_eq!(
            result.footer,
            vec![
                "- [계절학기](https://kau.ac.kr/9)",
                "- 📁 [안내문.hwp](https://kau.ac.kr/f/1)",
                "- 📁 [신청서.pdf](https://kau.ac.kr/f/2)",
            ]
        );
    }

    #[test]
    fn test_malformed_attachment_entries_skipped() {
        let cited = vec![doc("A", "https://a").with_meta(
            META_ATTACHMENTS,
            "깨진항목;|https://x;이름만|;a|b|c;정상.pdf|https://ok",
        )];

        let result = reconcile("답 [근거: 1]", &cited);
        assert_eq!(result.footer, vec!["- [A](https://a)", "- 📁 [정상.pdf](https://ok)"]);
    }

    #[test]
    fn test_duplicate_footer_lines_removed() {
        // 같은 공지의 서로 다른 청크가 각각 인용된 경우
        let shared = "공통.pdf|https://f";
        let cited = vec![
            doc("A", "https://a").with_meta(META_ATTACHMENTS, shared),
            RetrievedDocument::new("다른 청크")
                .with_meta(META_TITLE, "A")
                .with_meta(META_SOURCE, "https://a")
                .with_meta(META_ATTACHMENTS, shared),
        ];

        let result = reconcile("답 [근거: 1, 2]", &cited);
        assert_eq!(result.footer, vec!["- [A](https://a)", "- 📁 [공통.pdf](https://f)"]);
    }

    #[test]
    fn test_no_markers_leaves_text_trimmed() {
        let result = reconcile("  그냥 답변  \n", &[]);
        assert_eq!(result.text, "그냥 답변");
        assert_eq!(result.render(), "그냥 답변");
    }

    #[test]
    fn test_parse_attachments() {
        assert_eq!(
            parse_attachments("a.pdf|https://x ; b.hwp|https://y"),
            vec![("a.pdf", "https://x"), ("b.hwp", "https://y")]
        );
        assert!(parse_attachments("").is_empty());
    }
}
