//! 앙상블 검색 - 가중 순위 점수 합산 융합
//!
//! 검색기마다 상위 10개만 후보로 삼고, `rank`(0부터) 위치의 문서에
//! `weight * (10 - rank)` 점수를 줍니다. 같은 문서(`content` + 메타데이터)가
//! 여러 목록에 나오면 점수를 더하므로, 키워드와 벡터 검색 모두에 걸린 문서가
//! 한쪽에만 걸린 문서보다 앞섭니다 (가중 Borda count).
//!
//! 동점은 먼저 등장한 문서가 앞에 옵니다 (삽입 순서 + 안정 정렬).

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::{RetrievedDocument, Retriever};

/// 검색기별 후보 상한 (최종 k와 무관)
pub const PER_RETRIEVER_LIMIT: usize = 10;

/// 기본 최종 문서 수
pub const DEFAULT_K: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// 검색기 하나의 순위 목록
#[derive(Debug, Clone)]
pub struct RankedList {
    /// 검색기 이름
    pub retriever: String,
    pub weight: f64,
    pub documents: Vec<RetrievedDocument>,
}

/// 융합 점수가 붙은 문서
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: RetrievedDocument,
    /// 합산 점수
    pub score: f64,
    /// 이 문서를 찾은 검색기 이름 (중복 없음, 등장 순)
    pub matched_by: Vec<String>,
}

/// 가중치가 붙은 검색기
struct WeightedRetriever {
    retriever: Arc<dyn Retriever>,
    weight: f64,
}

// ============================================================================
// EnsembleRetriever
// ============================================================================

/// 앙상블 검색기
///
/// 여러 검색기의 결과를 하나의 순위로 융합합니다.
pub struct EnsembleRetriever {
    members: Vec<WeightedRetriever>,
    k: usize,
}

impl EnsembleRetriever {
    /// 빈 앙상블 생성
    ///
    /// # Arguments
    /// * `k` - 최종 반환 문서 수
    pub fn new(k: usize) -> Self {
        Self {
            members: Vec::new(),
            k,
        }
    }

    /// 검색기 추가 (추가 순서 = 질의 순서)
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, weight: f64) -> Self {
        self.members.push(WeightedRetriever { retriever, weight });
        self
    }

    /// 최종 문서 수
    pub fn k(&self) -> usize {
        self.k
    }

    /// 검색기 수
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 융합 검색
    ///
    /// 실패한 검색기는 빈 결과로 취급하며 에러를 전파하지 않습니다.
    pub async fn invoke(&self, query: &str) -> Vec<RetrievedDocument> {
        self.invoke_scored(query)
            .await
            .into_iter()
            .map(|s| s.document)
            .collect()
    }

    /// 융합 검색 (점수 포함)
    pub async fn invoke_scored(&self, query: &str) -> Vec<ScoredDocument> {
        // 검색기는 읽기 전용이라 동시에 질의해도 안전함. 결과는 선언 순서대로 소비.
        let lists = join_all(self.members.iter().map(|member| async move {
            let name = member.retriever.name().to_string();
            let documents = match member.retriever.retrieve(query).await {
                Ok(docs) => docs,
                Err(e) => {
                    tracing::warn!("Retriever '{}' failed, treating as empty: {:#}", name, e);
                    Vec::new()
                }
            };
            RankedList {
                retriever: name,
                weight: member.weight,
                documents,
            }
        }))
        .await;

        let fused = fuse_scored(lists, self.k);
        tracing::debug!("Fused {} documents for query: {}", fused.len(), query);
        fused
    }
}

// ============================================================================
// Fusion
// ============================================================================

/// 순위 목록들을 융합하여 상위 `k`개 문서 반환
pub fn fuse_ranked(lists: Vec<RankedList>, k: usize) -> Vec<RetrievedDocument> {
    fuse_scored(lists, k)
        .into_iter()
        .map(|s| s.document)
        .collect()
}

/// 순위 목록들을 융합하여 점수와 함께 상위 `k`개 반환
pub fn fuse_scored(lists: Vec<RankedList>, k: usize) -> Vec<ScoredDocument> {
    // 삽입 순서 = entries 순서, index는 키 → 위치
    let mut entries: Vec<ScoredDocument> = Vec::new();
    let mut index: HashMap<RetrievedDocument, usize> = HashMap::new();

    for list in lists {
        for (rank, doc) in list
            .documents
            .into_iter()
            .take(PER_RETRIEVER_LIMIT)
            .enumerate()
        {
            let score = list.weight * (PER_RETRIEVER_LIMIT - rank) as f64;

            match index.get(&doc) {
                Some(&pos) => {
                    let entry = &mut entries[pos];
                    entry.score += score;
                    if !entry.matched_by.contains(&list.retriever) {
                        entry.matched_by.push(list.retriever.clone());
                    }
                }
                None => {
                    index.insert(doc.clone(), entries.len());
                    entries.push(ScoredDocument {
                        document: doc,
                        score,
                        matched_by: vec![list.retriever.clone()],
                    });
                }
            }
        }
    }

    // sort_by는 안정 정렬이므로 동점은 삽입 순서 유지
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    entries.truncate(k);
    entries
}

// ============================================================================
// Tests
// ============================================================================
