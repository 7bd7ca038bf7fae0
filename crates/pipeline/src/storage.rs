//! 트랩 저장 -- 행 삽입과 알림 평가 핸드오프
//!
//! [`Persister`]는 파싱된 트랩을 [`TrapRow`]로 변환하여
//! [`TrapStore`]에 삽입하고, 생성된 행 id와 함께 트랩을
//! [`AlertEvaluator`]에 전달합니다. 파이프라인에서 행을 쓰는 곳은
//! 여기뿐이며, 삽입은 행 단위로 독립적입니다.
//!
//! 실제 관계형 저장소와 알림 엔진은 외부 협력자입니다. 이 모듈은
//! 테스트와 단독 실행 모드용 인메모리 구현([`MemoryTrapStore`],
//! [`NullAlertEvaluator`])을 함께 제공합니다.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use trapflow_core::error::StorageError;
use trapflow_core::pipeline::{AlertEvaluator, BoxFuture, TrapStore};
use trapflow_core::types::{Trap, TrapRow};

use crate::error::TrapPipelineError;

/// 트랩 영속화기
pub struct Persister {
    store: Arc<dyn TrapStore>,
    evaluator: Arc<dyn AlertEvaluator>,
}

impl Persister {
    /// 새 영속화기를 생성합니다.
    pub fn new(store: Arc<dyn TrapStore>, evaluator: Arc<dyn AlertEvaluator>) -> Self {
        Self { store, evaluator }
    }

    /// 트랩 하나를 저장하고 알림 평가에 넘깁니다.
    ///
    /// 삽입 실패는 에러로 전파됩니다 (호출 측이 로그 후 트랩을
    /// 포기 -- 인덱스는 이미 전진했으므로 재시도하지 않습니다).
    /// 알림 평가 실패는 경고 로그만 남깁니다.
    pub async fn persist(&self, trap: &Trap) -> Result<i64, TrapPipelineError> {
        let row = TrapRow::from_trap(trap, crate::unix_now());
        let trap_id = self.store.insert(&row).await?;

        if let Err(e) = self.evaluator.evaluate(trap_id, trap).await {
            warn!(trap_id, error = %e, "alert evaluation failed");
        }

        Ok(trap_id)
    }
}

/// 인메모리 트랩 저장소
///
/// 단조 증가 id를 반환합니다. 테스트와 단독 실행 모드에서
/// 사용됩니다.
#[derive(Default)]
pub struct MemoryTrapStore {
    rows: Mutex<Vec<TrapRow>>,
}

impl MemoryTrapStore {
    /// 새 인메모리 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 행의 복사본을 반환합니다.
    pub fn rows(&self) -> Vec<TrapRow> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 저장된 행 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 저장소가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrapStore for MemoryTrapStore {
    fn insert<'a>(&'a self, row: &'a TrapRow) -> BoxFuture<'a, Result<i64, StorageError>> {
        Box::pin(async move {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            rows.push(row.clone());
            Ok(rows.len() as i64)
        })
    }
}

/// 아무 동작도 하지 않는 알림 평가기
///
/// 알림 엔진이 연결되지 않은 배치에서 사용됩니다.
pub struct NullAlertEvaluator;

impl AlertEvaluator for NullAlertEvaluator {
    fn evaluate<'a>(
        &'a self,
        trap_id: i64,
        trap: &'a Trap,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            debug!(trap_id, source = %trap.source, "no alert evaluator attached");
            Ok(())
        })
    }
}
