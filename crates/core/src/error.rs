//! trapflow 에러 계층 -- 최상위 에러와 도메인별 세부 에러
//!
//! 각 크레이트는 세부 에러를 만들고 `?`로 [`TrapflowError`]까지
//! 끌어올립니다.

/// trapflow 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TrapflowError {
    /// 설정 로드/검증 실패
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기/처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 트랩 레코드 파싱 실패
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 저장소/알림 평가 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 파일 I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 로드와 검증에서 발생하는 에러
///
/// `trapflow.toml`을 읽는 단계([`Unreadable`](Self::Unreadable),
/// [`Malformed`](Self::Malformed))와 값 범위를 검증하는 단계
/// ([`Rejected`](Self::Rejected))를 구분합니다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 열거나 읽을 수 없음
    #[error("cannot read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// 설정 파일이 올바른 TOML이 아님
    #[error("config file is not valid TOML: {reason}")]
    Malformed { reason: String },

    /// 검증 단계에서 거부된 설정 값
    #[error("config value '{field}' rejected: {reason}")]
    Rejected { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 트랩 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 알 수 없는 wire 방언
    #[error("unknown trap dialect: '{0}'")]
    UnknownDialect(String),

    /// 필수 필드 누락
    #[error("missing field '{field}' in trap record")]
    MissingField { field: String },

    /// OID를 결정할 수 없음
    #[error("trap from '{addr}' has no usable oid")]
    MissingOid { addr: String },
}

/// 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장소에 접근할 수 없음
    #[error("trap store unreachable: {0}")]
    Unreachable(String),

    /// 행 삽입 실패
    #[error("insert failed: {0}")]
    Insert(String),

    /// 알림 평가 실패
    #[error("alert evaluation failed: {0}")]
    Evaluation(String),
}
