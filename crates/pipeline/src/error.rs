//! 트랩 파이프라인 에러 타입
//!
//! [`TrapPipelineError`]는 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<TrapPipelineError> for TrapflowError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use trapflow_core::error::{ParseError, PipelineError, StorageError, TrapflowError};

/// 트랩 파이프라인 도메인 에러
///
/// 테일링, 파싱, 저장, 재전송, 채널 통신 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum TrapPipelineError {
    /// 트랩 레코드 파싱 실패
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 로그 테일링 실패 (파일 열기, 읽기, 인덱스 기록)
    #[error("tailer error: {path}: {reason}")]
    Tailer {
        /// 대상 로그 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 하류 재전송 실패
    #[error("forward error: {0}")]
    Forward(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<TrapPipelineError> for TrapflowError {
    fn from(err: TrapPipelineError) -> Self {
        match err {
            TrapPipelineError::Parse(e) => TrapflowError::Parse(e),
            TrapPipelineError::Storage(e) => TrapflowError::Storage(e),
            TrapPipelineError::Io(e) => TrapflowError::Io(e),
            other => TrapflowError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
