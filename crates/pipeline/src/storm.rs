//! 스톰 보호 -- 출처별 슬라이딩 윈도우 속도 제한
//!
//! [`StormGuard`]는 윈도우 내 출처별 트랩 수를 세고, 임계치를 넘는
//! 출처를 일정 시간 침묵시킵니다. 침묵 전환마다 정확히 한 번
//! [`StormVerdict::Silence`]를 돌려주어 호출 측이 시스템 이벤트를
//! 발생시킬 수 있게 합니다.
//!
//! 모든 상태는 단일 생산자 스레드에서만 접근하므로 동기화가 필요
//! 없습니다. 시각은 unix 초로 주입받아 테스트가 결정적입니다.

use std::collections::HashMap;

/// 출처별 윈도우 통계
#[derive(Debug, Default)]
struct SourceStat {
    /// 현재 윈도우에서 관측된 트랩 수
    count: u32,
    /// 침묵 이벤트를 이미 발생시켰는지 여부 (전환당 한 번)
    event_emitted: bool,
}

/// 스톰 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StormVerdict {
    /// 처리 허용
    Admit,
    /// 조용히 드롭 (침묵 중이거나 이미 이벤트가 발생한 출처)
    Drop,
    /// 새로 침묵됨 -- 호출 측은 이벤트를 한 번 발생시키고 드롭
    Silence {
        /// 침묵 해제 시각 (unix 초)
        until: u64,
        /// 현재 윈도우에서 관측된 트랩 수
        count: u32,
    },
}

/// 출처별 스톰 보호
pub struct StormGuard {
    /// 윈도우당 출처별 허용 트랩 수 (0이면 비활성화)
    threshold: u32,
    /// 윈도우 길이 (초)
    window_secs: u64,
    /// 침묵 기간 (초, 0이면 윈도우 길이를 사용)
    silence_secs: u64,
    /// 현재 윈도우 시작 시각 (unix 초)
    window_start: u64,
    /// 출처별 통계
    stats: HashMap<String, SourceStat>,
    /// 침묵 중인 출처와 해제 시각
    silences: HashMap<String, u64>,
}

impl StormGuard {
    /// 새 스톰 가드를 생성합니다.
    pub fn new(threshold: u32, window_secs: u64, silence_secs: u64) -> Self {
        Self {
            threshold,
            window_secs,
            silence_secs,
            window_start: 0,
            stats: HashMap::new(),
            silences: HashMap::new(),
        }
    }

    /// 필요 시 윈도우를 리셋합니다.
    ///
    /// 윈도우가 만료되었거나 `force`(틱마다 리셋하는 직렬화 모드)가
    /// 켜진 경우 출처별 통계를 모두 비웁니다. 침묵 목록은 유지됩니다.
    pub fn maybe_reset(&mut self, now: u64, force: bool) {
        if force || now > self.window_start + self.window_secs {
            self.window_start = now;
            self.stats.clear();
        }
    }

    /// 출처 `source`의 트랩 하나에 대한 판정을 내립니다.
    pub fn check(&mut self, source: &str, now: u64) -> StormVerdict {
        let (count, event_emitted) = {
            let stat = self.stats.entry(source.to_owned()).or_default();
            stat.count += 1;
            (stat.count, stat.event_emitted)
        };

        if let Some(&until) = self.silences.get(source) {
            if now < until {
                return StormVerdict::Drop;
            }
            // 만료된 침묵은 지연 정리
            self.silences.remove(source);
        }

        if self.threshold > 0 && count > self.threshold {
            if !event_emitted {
                let period = if self.silence_secs > 0 {
                    self.silence_secs
                } else {
                    self.window_secs
                };
                let until = now + period;
                self.silences.insert(source.to_owned(), until);
                if let Some(stat) = self.stats.get_mut(source) {
                    stat.event_emitted = true;
                }
                return StormVerdict::Silence { until, count };
            }
            return StormVerdict::Drop;
        }

        StormVerdict::Admit
    }

    /// 침묵 중인 출처 수를 반환합니다 (만료 여부와 무관).
    pub fn silenced_count(&self) -> usize {
        self.silences.len()
    }
}
