//! 파이프라인 오케스트레이션 -- 수집/판정/소비의 전체 흐름을 관리합니다.
//!
//! [`TrapPipeline`]은 core의 [`Pipeline`] trait을 구현하여
//! `trapflow-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! LogTailer(s) -> Dispatcher(틱 루프) -> WorkerPool
//!                     |                      |
//!          StormGuard / SourceLockSet   파싱 -> 필터 -> (재전송) -> 저장
//! ```

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use trapflow_core::error::{PipelineError, TrapflowError};
use trapflow_core::event::StormEvent;
use trapflow_core::pipeline::{AlertEvaluator, HealthStatus, Pipeline, TrapStore};

use crate::config::ConsoleConfig;
use crate::dispatch::{Dispatcher, PipelineCounters};
use crate::error::TrapPipelineError;
use crate::filter::{FilterEngine, FilterGroup};
use crate::storage::{MemoryTrapStore, NullAlertEvaluator};

/// carry-over 버퍼가 이 길이를 넘으면 상태를 Degraded로 보고합니다.
const MAX_HEALTHY_BACKLOG: u64 = 10_000;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// SNMP 트랩 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use trapflow_pipeline::{TrapPipelineBuilder, ConsoleConfig};
///
/// let (mut pipeline, storm_rx) = TrapPipelineBuilder::new()
///     .config(config)
///     .store(store)
///     .build()?;
///
/// pipeline.start().await?;
/// ```
pub struct TrapPipeline {
    /// 파이프라인 설정
    config: ConsoleConfig,
    /// 현재 상태
    state: PipelineState,
    /// 디스패처 (실행 중에는 틱 루프 태스크가 소유)
    dispatcher: Option<Dispatcher>,
    /// 틱 루프 태스크 핸들 (종료 시 디스패처를 돌려받음)
    task: Option<JoinHandle<Dispatcher>>,
    /// 종료 신호
    cancel: CancellationToken,
    /// 공유 카운터
    counters: PipelineCounters,
}

impl TrapPipeline {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 저장까지 완료된 트랩 수를 반환합니다.
    pub fn processed_count(&self) -> u64 {
        self.counters.processed.load(Ordering::Relaxed)
    }

    /// 파싱 실패로 버린 레코드 수를 반환합니다.
    pub fn parse_error_count(&self) -> u64 {
        self.counters.parse_errors.load(Ordering::Relaxed)
    }

    /// 필터 매칭으로 버린 트랩 수를 반환합니다.
    pub fn filtered_count(&self) -> u64 {
        self.counters.filtered.load(Ordering::Relaxed)
    }

    /// 스톰 보호로 버린 트랩 수를 반환합니다.
    pub fn storm_dropped_count(&self) -> u64 {
        self.counters.storm_dropped.load(Ordering::Relaxed)
    }

    /// 연기된 라인 수(누적)를 반환합니다.
    pub fn deferred_count(&self) -> u64 {
        self.counters.deferred.load(Ordering::Relaxed)
    }

    /// 생산자 패스 하나를 직접 실행합니다.
    ///
    /// 틱 루프 없이 파이프라인을 임베딩하거나 결정적으로 시험할 때
    /// 사용합니다. 실행 중에는 호출할 수 없습니다. 제출된 태스크
    /// 수를 반환합니다.
    pub async fn run_once(&mut self) -> Result<usize, TrapflowError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let dispatcher = self.dispatcher.as_mut().ok_or_else(|| {
            TrapflowError::Pipeline(PipelineError::InitFailed(
                "dispatcher unavailable".to_owned(),
            ))
        })?;
        dispatcher.run_tick().await.map_err(TrapflowError::from)
    }
}

impl Pipeline for TrapPipeline {
    async fn start(&mut self) -> Result<(), TrapflowError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let mut dispatcher = self.dispatcher.take().ok_or_else(|| {
            TrapflowError::Pipeline(PipelineError::InitFailed(
                "dispatcher unavailable".to_owned(),
            ))
        })?;

        // 시작 시점에 로그 파일을 열 수 없으면 치명 에러
        if let Err(e) = dispatcher.open_tailers().await {
            self.dispatcher = Some(dispatcher);
            return Err(e.into());
        }

        let cancel = CancellationToken::new();
        self.cancel = cancel.clone();

        let tick = Duration::from_secs(self.config.tick_secs);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(tick);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = dispatcher.run_tick().await {
                            error!(error = %e, "producer pass failed");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }

            dispatcher.release_locks();
            dispatcher
        });

        self.task = Some(handle);
        self.state = PipelineState::Running;
        info!(
            tick_secs = self.config.tick_secs,
            workers = self.config.worker_threads,
            "trap pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TrapflowError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping trap pipeline");
        self.cancel.cancel();

        // 진행 중인 틱(워커 드레인 포함)이 끝날 때까지 기다린 뒤
        // 디스패처를 돌려받아 재시작을 지원합니다.
        if let Some(handle) = self.task.take() {
            match handle.await {
                Ok(dispatcher) => self.dispatcher = Some(dispatcher),
                Err(e) => error!(error = %e, "pipeline task failed during shutdown"),
            }
        }

        self.state = PipelineState::Stopped;
        info!("trap pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let backlog = self.counters.backlog.load(Ordering::Relaxed);
                if backlog > MAX_HEALTHY_BACKLOG {
                    HealthStatus::Degraded(format!("carry-over backlog: {backlog} lines"))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 트랩 파이프라인 빌더
///
/// 저장소/알림 평가기/필터/이벤트 채널을 조립하고 파이프라인을
/// 생성합니다. 저장소를 지정하지 않으면 인메모리 저장소가,
/// 평가기를 지정하지 않으면 no-op 평가기가 사용됩니다.
pub struct TrapPipelineBuilder {
    config: ConsoleConfig,
    store: Option<Arc<dyn TrapStore>>,
    evaluator: Option<Arc<dyn AlertEvaluator>>,
    filters: Vec<FilterGroup>,
    event_tx: Option<mpsc::Sender<StormEvent>>,
    event_channel_capacity: usize,
}

impl TrapPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ConsoleConfig::default(),
            store: None,
            evaluator: None,
            filters: Vec::new(),
            event_tx: None,
            event_channel_capacity: 64,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: ConsoleConfig) -> Self {
        self.config = config;
        self
    }

    /// 트랩 저장소를 지정합니다.
    pub fn store(mut self, store: Arc<dyn TrapStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 알림 평가기를 지정합니다.
    pub fn evaluator(mut self, evaluator: Arc<dyn AlertEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// 외부 저장소에서 로드된 필터 그룹을 지정합니다.
    pub fn filters(mut self, filters: Vec<FilterGroup>) -> Self {
        self.filters = filters;
        self
    }

    /// 외부 스톰 이벤트 전송 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 새 채널을 생성합니다.
    pub fn event_sender(mut self, tx: mpsc::Sender<StormEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 스톰 이벤트 채널 용량을 설정합니다 (외부 채널 미사용 시).
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// # Returns
    /// - `TrapPipeline`: 파이프라인 인스턴스
    /// - `Option<mpsc::Receiver<StormEvent>>`: 스톰 이벤트 수신 채널
    ///   (외부 event_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(TrapPipeline, Option<mpsc::Receiver<StormEvent>>), TrapPipelineError> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTrapStore::new()));
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(NullAlertEvaluator));

        let (event_tx, event_rx) = match self.event_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.event_channel_capacity);
                (tx, Some(rx))
            }
        };

        let counters = PipelineCounters::default();
        let dispatcher = Dispatcher::new(
            self.config.clone(),
            store,
            evaluator,
            FilterEngine::new(self.filters),
            event_tx,
            counters.clone(),
        )?;

        let pipeline = TrapPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            dispatcher: Some(dispatcher),
            task: None,
            cancel: CancellationToken::new(),
            counters,
        };

        Ok((pipeline, event_rx))
    }
}

impl Default for TrapPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
