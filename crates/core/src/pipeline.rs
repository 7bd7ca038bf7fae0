//! 파이프라인 trait -- 모듈 생명주기 및 외부 협력자 경계 정의
//!
//! [`Pipeline`] trait은 장기 실행 모듈의 생명주기 인터페이스입니다.
//! [`TrapStore`]와 [`AlertEvaluator`]는 관계형 저장소와 알림 평가 엔진을
//! 외부 협력자로 추상화하는 확장 포인트입니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, TrapflowError};
use crate::types::{Trap, TrapRow};

/// dyn-compatible Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 장기 실행 모듈이 구현하는 생명주기 trait
///
/// `trapflow-daemon`에서 모듈을 시작/정지하고 상태를 확인하는 데 사용됩니다.
///
/// # 구현 예시
/// ```ignore
/// impl Pipeline for TrapPipeline {
///     async fn start(&mut self) -> Result<(), TrapflowError> {
///         // 테일러 열기, 틱 루프 스폰
///         Ok(())
///     }
///
///     async fn stop(&mut self) -> Result<(), TrapflowError> {
///         // 워커 드레인, 리소스 정리
///         Ok(())
///     }
///
///     async fn health_check(&self) -> HealthStatus {
///         HealthStatus::Healthy
///     }
/// }
/// ```
pub trait Pipeline: Send + Sync {
    /// 모듈을 시작합니다.
    ///
    /// 이미 실행 중인 경우 `PipelineError::AlreadyRunning`을 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), TrapflowError>> + Send;

    /// 모듈을 정지합니다.
    ///
    /// 진행 중인 작업을 완료(큐 드레인)하고 리소스를 정리합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), TrapflowError>> + Send;

    /// 모듈의 현재 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn-compatible 파이프라인 trait
///
/// `Pipeline`은 RPITIT를 사용하므로 `dyn Pipeline`이 불가합니다.
/// `DynPipeline`은 `BoxFuture`를 반환하여 모듈을 동적으로 관리할 수
/// 있게 합니다. `Pipeline` 구현 타입은 blanket impl으로 자동 지원됩니다.
pub trait DynPipeline: Send + Sync {
    /// 모듈을 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), TrapflowError>>;

    /// 모듈을 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), TrapflowError>>;

    /// 모듈의 현재 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), TrapflowError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), TrapflowError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}

/// 모듈 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 성능 저하 또는 부분적 장애 (서비스는 계속 동작)
    Degraded(String),
    /// 비정상 -- 서비스 불가 상태
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 트랩 저장소 경계 trait
///
/// 관계형 저장소는 외부 협력자이며, 파이프라인은 행 삽입만 요구합니다.
/// 삽입은 행 단위로 독립적이고, 생성된 행 id를 반환합니다.
pub trait TrapStore: Send + Sync {
    /// 트랩 행 하나를 삽입하고 생성된 id를 반환합니다.
    fn insert<'a>(&'a self, row: &'a TrapRow) -> BoxFuture<'a, Result<i64, StorageError>>;
}

/// 알림 평가 엔진 경계 trait
///
/// 행 삽입 직후 저장된 트랩을 알림 평가 엔진에 전달합니다.
/// 평가 실패는 파이프라인을 중단시키지 않습니다 (호출 측에서 로그만 남김).
pub trait AlertEvaluator: Send + Sync {
    /// 저장된 트랩에 대해 알림 평가를 수행합니다.
    fn evaluate<'a>(
        &'a self,
        trap_id: i64,
        trap: &'a Trap,
    ) -> BoxFuture<'a, Result<(), StorageError>>;
}
