//! 디스패처 -- 틱 단위 생산자 패스와 워커 소비 로직
//!
//! 틱마다 carry-over 버퍼, 기본 로그, 보조 로그 순서로 논리 라인을
//! 모두 끌어와 스톰 판정과 출처 락 판정을 거쳐 태스크 배치를 만들고,
//! 워커 풀에 제출하여 드레인을 기다립니다.
//!
//! 라인을 끌어올 때마다 테일러 인덱스를 먼저 체크포인트하므로
//! (저장 전에 인덱스가 전진) 전달 보장은 at-least-once입니다.
//! 락이 거부된 라인은 다음 틱의 carry-over 버퍼로 연기되어 출처별
//! FIFO 순서가 유지됩니다. 강제 종료 시 carry-over 버퍼는 버려집니다.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use trapflow_core::event::StormEvent;
use trapflow_core::metrics::{
    CONSOLE_INSERT_FAILURES_TOTAL, CONSOLE_LINES_DEFERRED_TOTAL, CONSOLE_STORM_SILENCED_TOTAL,
    CONSOLE_TRAPS_DROPPED_TOTAL, CONSOLE_TRAPS_PROCESSED_TOTAL, LABEL_REASON,
};
use trapflow_core::pipeline::{AlertEvaluator, TrapStore};

use crate::config::ConsoleConfig;
use crate::error::TrapPipelineError;
use crate::filter::FilterEngine;
use crate::forward::TrapForwarder;
use crate::lock::SourceLockSet;
use crate::parser::{self, TrapParser};
use crate::storage::Persister;
use crate::storm::{StormGuard, StormVerdict};
use crate::tailer::LogTailer;
use crate::worker::WorkerPool;

/// 트랩 레코드 시작 패턴
const RECORD_PATTERN: &str = r"^SNMPv[12]\[\*\*\]";

/// 워커에게 전달되는 태스크
///
/// `source`는 생산자가 저비용으로 추출한 원본 출처 필드로,
/// 락 획득과 해제에 같은 키가 쓰이는 것을 보장합니다.
pub(crate) struct TrapTask {
    /// 원본 논리 라인
    pub line: String,
    /// 원본 출처 필드 (정규화 전)
    pub source: String,
}

/// 파이프라인 공유 카운터
#[derive(Clone, Default)]
pub(crate) struct PipelineCounters {
    /// 저장까지 완료된 트랩 수
    pub processed: Arc<AtomicU64>,
    /// 파싱 실패로 버린 레코드 수
    pub parse_errors: Arc<AtomicU64>,
    /// 필터 매칭으로 버린 트랩 수
    pub filtered: Arc<AtomicU64>,
    /// 스톰 보호로 버린 트랩 수
    pub storm_dropped: Arc<AtomicU64>,
    /// 다음 틱으로 연기된 라인 수 (누적)
    pub deferred: Arc<AtomicU64>,
    /// 행 삽입 실패 수
    pub insert_failures: Arc<AtomicU64>,
    /// 현재 carry-over 버퍼 길이
    pub backlog: Arc<AtomicU64>,
}

/// 워커가 공유하는 처리 문맥
struct WorkerContext {
    parser: TrapParser,
    filters: FilterEngine,
    forwarder: Option<TrapForwarder>,
    persister: Persister,
    locks: Arc<SourceLockSet>,
    insert_delay: Duration,
    counters: PipelineCounters,
}

/// 틱 단위 디스패처
pub(crate) struct Dispatcher {
    config: ConsoleConfig,
    tailers: Vec<LogTailer>,
    tailers_opened: bool,
    carry_over: VecDeque<String>,
    storm: StormGuard,
    locks: Arc<SourceLockSet>,
    pool: WorkerPool,
    ctx: Arc<WorkerContext>,
    event_tx: mpsc::Sender<StormEvent>,
    record_pattern: Regex,
    counters: PipelineCounters,
}

impl Dispatcher {
    /// 새 디스패처를 구성합니다.
    pub(crate) fn new(
        config: ConsoleConfig,
        store: Arc<dyn TrapStore>,
        evaluator: Arc<dyn AlertEvaluator>,
        filters: FilterEngine,
        event_tx: mpsc::Sender<StormEvent>,
        counters: PipelineCounters,
    ) -> Result<Self, TrapPipelineError> {
        let locks = Arc::new(SourceLockSet::new(config.serialize_by_source));

        let forwarder = if config.forward.enabled {
            Some(TrapForwarder::new(config.forward.clone())?)
        } else {
            None
        };

        let ctx = Arc::new(WorkerContext {
            parser: TrapParser::new(config.use_pdu_address),
            filters,
            forwarder,
            persister: Persister::new(store, evaluator),
            locks: Arc::clone(&locks),
            insert_delay: Duration::from_secs(config.insert_delay_secs),
            counters: counters.clone(),
        });

        Ok(Self {
            storm: StormGuard::new(
                config.storm_threshold,
                config.storm_window_secs,
                config.silence_secs,
            ),
            pool: WorkerPool::new(config.worker_threads),
            record_pattern: Regex::new(RECORD_PATTERN)?,
            tailers: Vec::new(),
            tailers_opened: false,
            carry_over: VecDeque::new(),
            locks,
            ctx,
            event_tx,
            counters,
            config,
        })
    }

    /// 설정된 로그 파일들을 엽니다 (최초 1회).
    ///
    /// 시작 시점에 로그 파일을 열 수 없으면 치명 에러입니다.
    pub(crate) async fn open_tailers(&mut self) -> Result<(), TrapPipelineError> {
        if self.tailers_opened {
            return Ok(());
        }

        let mut tailers = vec![LogTailer::open(&self.config.log_file).await?];
        if let Some(extra) = &self.config.extra_log_file {
            tailers.push(LogTailer::open(extra).await?);
        }

        self.tailers = tailers;
        self.tailers_opened = true;
        Ok(())
    }

    /// 생산자 패스 하나를 실행하고 워커 풀 드레인을 기다립니다.
    ///
    /// 제출된 태스크 수를 반환합니다.
    pub(crate) async fn run_tick(&mut self) -> Result<usize, TrapPipelineError> {
        self.open_tailers().await?;

        let now = crate::unix_now();
        self.storm.maybe_reset(now, self.config.serialize_by_source);
        let mut snapshot = self.locks.snapshot();

        // carry-over 버퍼를 물리 로그보다 먼저 소비
        let mut lines: Vec<String> = self.carry_over.drain(..).collect();

        for tailer in &mut self.tailers {
            if let Err(e) = tailer.check_truncation().await {
                warn!(
                    path = %tailer.log_path().display(),
                    error = %e,
                    "rotation check failed, skipping file this tick"
                );
                continue;
            }

            loop {
                match tailer.next_record().await {
                    Ok(Some(line)) => {
                        // 다음 레코드를 읽기 전에 재개 지점을 기록
                        if let Err(e) = tailer.checkpoint().await {
                            warn!(
                                path = %tailer.log_path().display(),
                                error = %e,
                                "failed to write index checkpoint"
                            );
                        }
                        lines.push(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(
                            path = %tailer.log_path().display(),
                            error = %e,
                            "failed to read trap record"
                        );
                        break;
                    }
                }
            }
        }

        let mut tasks: Vec<TrapTask> = Vec::new();
        let mut deferred: VecDeque<String> = VecDeque::new();
        for line in lines {
            self.admit_line(line, now, &mut snapshot, &mut tasks, &mut deferred);
        }

        self.carry_over = deferred;
        self.counters
            .backlog
            .store(self.carry_over.len() as u64, Ordering::Relaxed);

        let batch = tasks.len();
        if batch > 0 {
            debug!(batch, "submitting trap batch to worker pool");
            let ctx = Arc::clone(&self.ctx);
            self.pool
                .run_batch(tasks, move |task| process_task(Arc::clone(&ctx), task))
                .await;
        }

        Ok(batch)
    }

    /// 라인 하나에 대해 {버림, 연기, 태스크 등록}을 판정합니다.
    fn admit_line(
        &mut self,
        line: String,
        now: u64,
        snapshot: &mut HashSet<String>,
        tasks: &mut Vec<TrapTask>,
        deferred: &mut VecDeque<String>,
    ) {
        if !self.record_pattern.is_match(&line) {
            debug!("skipping line without trap record marker");
            return;
        }

        let source = match parser::raw_source_field(&line) {
            Some(field) if !field.trim().is_empty() => field.to_owned(),
            _ => {
                debug!("skipping record without source field");
                return;
            }
        };

        match self.storm.check(&source, now) {
            StormVerdict::Admit => {}
            StormVerdict::Drop => {
                self.counters.storm_dropped.fetch_add(1, Ordering::Relaxed);
                counter!(CONSOLE_TRAPS_DROPPED_TOTAL, LABEL_REASON => "storm").increment(1);
                return;
            }
            StormVerdict::Silence { until, count } => {
                self.counters.storm_dropped.fetch_add(1, Ordering::Relaxed);
                counter!(CONSOLE_STORM_SILENCED_TOTAL).increment(1);
                counter!(CONSOLE_TRAPS_DROPPED_TOTAL, LABEL_REASON => "storm").increment(1);
                warn!(
                    source = %source,
                    count,
                    until,
                    "too many traps from source, silencing"
                );
                if let Err(e) = self
                    .event_tx
                    .try_send(StormEvent::new(source.as_str(), count, until))
                {
                    debug!(error = %e, "storm event receiver unavailable");
                }
                return;
            }
        }

        if self.locks.enabled() {
            if snapshot.contains(&source) {
                self.counters.deferred.fetch_add(1, Ordering::Relaxed);
                counter!(CONSOLE_LINES_DEFERRED_TOTAL).increment(1);
                deferred.push_back(line);
                return;
            }
            snapshot.insert(source.clone());
            self.locks.acquire(&source);
        }

        tasks.push(TrapTask { line, source });
    }

    /// 보유 중인 출처 락을 모두 해제합니다 (종료 시).
    pub(crate) fn release_locks(&self) {
        self.locks.clear();
    }
}

/// 워커 소비 로직: 파싱 -> 필터 -> (재전송) -> 저장 -> 지연 -> 락 해제
async fn process_task(ctx: Arc<WorkerContext>, task: TrapTask) {
    // 패닉을 포함한 모든 경로에서 출처 락을 해제하는 가드
    let _guard = ctx.locks.guard(task.source.as_str());

    let trap = match ctx.parser.parse(&task.line) {
        Ok(trap) => trap,
        Err(e) => {
            ctx.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
            counter!(CONSOLE_TRAPS_DROPPED_TOTAL, LABEL_REASON => "parse").increment(1);
            debug!(error = %e, "dropping malformed trap record");
            return;
        }
    };

    if let Some(group_id) = ctx.filters.matches(&trap.raw_tail) {
        ctx.counters.filtered.fetch_add(1, Ordering::Relaxed);
        counter!(CONSOLE_TRAPS_DROPPED_TOTAL, LABEL_REASON => "filter").increment(1);
        debug!(source = %trap.source, group_id, "trap matched filter group, dropping");
        return;
    }

    if let Some(forwarder) = &ctx.forwarder {
        forwarder.forward(&trap).await;
    }

    match ctx.persister.persist(&trap).await {
        Ok(trap_id) => {
            ctx.counters.processed.fetch_add(1, Ordering::Relaxed);
            counter!(CONSOLE_TRAPS_PROCESSED_TOTAL).increment(1);
            debug!(trap_id, source = %trap.source, oid = %trap.oid, "trap stored");
        }
        Err(e) => {
            ctx.counters.insert_failures.fetch_add(1, Ordering::Relaxed);
            counter!(CONSOLE_INSERT_FAILURES_TOTAL).increment(1);
            error!(source = %trap.source, error = %e, "failed to store trap, record lost");
        }
    }

    if !ctx.insert_delay.is_zero() {
        sleep(ctx.insert_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsoleConfigBuilder;
    use crate::storage::{MemoryTrapStore, NullAlertEvaluator};
    use std::io::Write;
    use std::path::Path;

    fn write_lines(path: &Path, lines: &[&str]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn dispatcher_for(
        config: ConsoleConfig,
        store: Arc<MemoryTrapStore>,
    ) -> (Dispatcher, mpsc::Receiver<StormEvent>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let dispatcher = Dispatcher::new(
            config,
            store,
            Arc::new(NullAlertEvaluator),
            FilterEngine::new(Vec::new()),
            event_tx,
            PipelineCounters::default(),
        )
        .unwrap();
        (dispatcher, event_rx)
    }

    #[tokio::test]
    async fn tick_drains_file_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(
            &path,
            &[
                "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x\t.1.3.6.1.6.3.1.1.5.2\ta",
                "SNMPv2[**]2024-01-15[**]10:20:31[**]10.0.0.2[**]x\t.1.3.6.1.6.3.1.1.5.3\tb",
            ],
        );

        let config = ConsoleConfigBuilder::new()
            .log_file(path.to_string_lossy())
            .worker_threads(2)
            .build()
            .unwrap();
        let store = Arc::new(MemoryTrapStore::new());
        let (mut dispatcher, _rx) = dispatcher_for(config, Arc::clone(&store));

        let batch = dispatcher.run_tick().await.unwrap();
        assert_eq!(batch, 2);
        assert_eq!(store.len(), 2);

        // 두 번째 틱에서는 새 레코드가 없음
        let batch = dispatcher.run_tick().await.unwrap();
        assert_eq!(batch, 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn noise_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(
            &path,
            &[
                "NET-SNMP version 5.9 restarted",
                "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x\t.1.3\ta",
            ],
        );

        let config = ConsoleConfigBuilder::new()
            .log_file(path.to_string_lossy())
            .build()
            .unwrap();
        let store = Arc::new(MemoryTrapStore::new());
        let (mut dispatcher, _rx) = dispatcher_for(config, Arc::clone(&store));

        dispatcher.run_tick().await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn locked_source_lines_deferred_to_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        write_lines(
            &path,
            &[
                "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x\t.1.3\tA1",
                "SNMPv2[**]2024-01-15[**]10:20:31[**]10.0.0.1[**]x\t.1.3\tA2",
            ],
        );

        let config = ConsoleConfigBuilder::new()
            .log_file(path.to_string_lossy())
            .serialize_by_source(true)
            .build()
            .unwrap();
        let store = Arc::new(MemoryTrapStore::new());
        let (mut dispatcher, _rx) = dispatcher_for(config, Arc::clone(&store));

        // 첫 틱: 같은 출처의 두 번째 라인은 연기됨
        let batch = dispatcher.run_tick().await.unwrap();
        assert_eq!(batch, 1);
        assert_eq!(store.len(), 1);
        assert!(store.rows()[0].oid_custom.contains("A1"));

        // 두 번째 틱: 연기된 라인이 처리됨
        let batch = dispatcher.run_tick().await.unwrap();
        assert_eq!(batch, 1);
        assert_eq!(store.len(), 2);
        assert!(store.rows()[1].oid_custom.contains("A2"));
    }

    #[tokio::test]
    async fn storm_silence_emits_single_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traps.log");
        let lines: Vec<String> = (0..10)
            .map(|i| {
                format!("SNMPv2[**]2024-01-15[**]10:20:{i:02}[**]1.2.3.4[**]x\t.1.3\tpayload{i}")
            })
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        write_lines(&path, &refs);

        let config = ConsoleConfigBuilder::new()
            .log_file(path.to_string_lossy())
            .storm(5, 60, 60)
            .build()
            .unwrap();
        let store = Arc::new(MemoryTrapStore::new());
        let (mut dispatcher, mut event_rx) = dispatcher_for(config, Arc::clone(&store));

        dispatcher.run_tick().await.unwrap();

        // 1-5번째만 저장, 6번째에서 이벤트 한 번
        assert_eq!(store.len(), 5);
        let event = event_rx.try_recv().unwrap();
        assert_eq!(event.source, "1.2.3.4");
        assert!(event_rx.try_recv().is_err());
    }
}
