//! 트랩 필터 -- 그룹화된 정규식 필터 평가
//!
//! 필터는 외부 저장소에서 정수 `group_id`로 묶인 패턴 목록으로
//! 로드됩니다. 한 그룹의 모든 패턴이 트랩의 원본 라인에 매칭되면
//! (그룹 내 AND, 그룹 간 OR) 그 트랩은 조용히 버려집니다.
//!
//! 패턴은 로드 시 한 번만 대소문자 무시로 컴파일됩니다. 컴파일에
//! 실패한 패턴은 "절대 매칭되지 않음"으로 취급되어(fail-closed)
//! 해당 그룹 전체가 매칭 불가가 되며, 서비스는 계속 동작합니다.

use regex::{Regex, RegexBuilder};
use tracing::warn;

/// 외부 저장소에서 로드된 필터 그룹 (컴파일 전)
#[derive(Debug, Clone)]
pub struct FilterGroup {
    /// 그룹 식별자
    pub id: i64,
    /// 정규식 패턴 목록 (그룹 내 AND 결합)
    pub patterns: Vec<String>,
}

impl FilterGroup {
    /// 새 필터 그룹을 생성합니다.
    pub fn new(id: i64, patterns: Vec<String>) -> Self {
        Self { id, patterns }
    }
}

/// 컴파일된 필터 그룹
struct CompiledGroup {
    id: i64,
    regexes: Vec<Regex>,
    /// 모든 패턴이 컴파일에 성공했는지 여부
    complete: bool,
}

/// 트랩 필터 엔진
pub struct FilterEngine {
    groups: Vec<CompiledGroup>,
}

impl FilterEngine {
    /// 필터 그룹을 컴파일하여 엔진을 생성합니다.
    ///
    /// 컴파일 실패는 경고 로그를 남기고 해당 그룹을 매칭 불가로
    /// 표시할 뿐, 에러를 반환하지 않습니다.
    pub fn new(groups: Vec<FilterGroup>) -> Self {
        let compiled = groups
            .into_iter()
            .map(|group| {
                let mut regexes = Vec::with_capacity(group.patterns.len());
                let mut complete = true;
                for pattern in &group.patterns {
                    match RegexBuilder::new(pattern).case_insensitive(true).build() {
                        Ok(regex) => regexes.push(regex),
                        Err(e) => {
                            warn!(
                                group_id = group.id,
                                pattern = %pattern,
                                error = %e,
                                "invalid filter pattern, group can never match"
                            );
                            complete = false;
                        }
                    }
                }
                CompiledGroup {
                    id: group.id,
                    regexes,
                    complete,
                }
            })
            .collect();

        Self { groups: compiled }
    }

    /// 필터가 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 로드된 그룹 수를 반환합니다.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// 트랩의 원본 라인이 필터에 매칭되는지 평가합니다.
    ///
    /// 그룹 내 패턴은 첫 실패에서 단락 평가됩니다. 패턴이 없는
    /// 그룹은 매칭되지 않는 것으로 취급합니다.
    pub fn matches(&self, tail: &str) -> Option<i64> {
        self.groups
            .iter()
            .find(|group| {
                group.complete
                    && !group.regexes.is_empty()
                    && group.regexes.iter().all(|regex| regex.is_match(tail))
            })
            .map(|group| group.id)
    }
}
