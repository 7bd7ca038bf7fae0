#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`tailer`]: 트랩 로그 테일링 (멀티라인 재조립, 인덱스 체크포인트, 로테이션 감지)
//! - [`parser`]: `[**]` 구분 v1/v2 레코드 파싱 및 출처 정규화
//! - [`storm`]: 출처별 슬라이딩 윈도우 스톰 보호
//! - [`lock`]: 출처별 처리 직렬화 락
//! - [`filter`]: 그룹화된 정규식 필터
//! - [`forward`]: 하류 snmptrap 호환 재전송
//! - [`storage`]: 행 삽입과 알림 평가 핸드오프
//! - [`worker`]: 세마포어 제한 워커 풀
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입

pub mod config;
pub mod error;
pub mod filter;
pub mod forward;
pub mod lock;
pub mod parser;
pub mod pipeline;
pub mod storage;
pub mod storm;
pub mod tailer;
pub mod worker;

mod dispatch;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{TrapPipeline, TrapPipelineBuilder};

// 설정
pub use config::{ConsoleConfig, ConsoleConfigBuilder};

// 에러
pub use error::TrapPipelineError;

// 구성 요소
pub use filter::{FilterEngine, FilterGroup};
pub use forward::{TrapForwarder, Varbind};
pub use lock::{SourceLockGuard, SourceLockSet};
pub use parser::TrapParser;
pub use storage::{MemoryTrapStore, NullAlertEvaluator, Persister};
pub use storm::{StormGuard, StormVerdict};
pub use tailer::LogTailer;
pub use worker::WorkerPool;

/// 현재 시각을 unix 초로 반환합니다.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
