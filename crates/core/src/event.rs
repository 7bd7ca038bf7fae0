//! 이벤트 시스템 -- 파이프라인이 외부로 알리는 시스템 이벤트
//!
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 추적 정보이며,
//! [`Event`] trait은 이벤트 타입이 구현하는 인터페이스입니다.
//! 현재 사용자에게 노출되는 이벤트는 스톰 전환 시 한 번 발생하는
//! [`StormEvent`]뿐입니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 트랩 파이프라인 모듈명
pub const MODULE_TRAP_PIPELINE: &str = "trap-pipeline";

/// 스톰 이벤트 타입
pub const EVENT_TYPE_STORM: &str = "storm";

/// 이벤트 메타데이터 -- 발생 시각, 생성 모듈, 추적 ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 추적 ID -- 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        write!(
            f,
            "[{}] source={} trace={}",
            secs, self.source_module, self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 스톰 보호가 출처를 침묵시킬 때 발생하는 시스템 이벤트
///
/// 침묵 전환마다 정확히 한 번 발생합니다.
#[derive(Debug, Clone)]
pub struct StormEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 침묵된 출처
    pub source: String,
    /// 현재 윈도우에서 관측된 트랩 수
    pub trap_count: u32,
    /// 침묵 해제 시각 (unix 초)
    pub silenced_until: u64,
}

impl StormEvent {
    /// 새 스톰 이벤트를 생성합니다.
    pub fn new(source: impl Into<String>, trap_count: u32, silenced_until: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_TRAP_PIPELINE),
            source: source.into(),
            trap_count,
            silenced_until,
        }
    }
}

impl Event for StormEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_STORM
    }
}

impl fmt::Display for StormEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StormEvent[{}] too many traps from {} (count={}), silenced until {}",
            &self.id[..8.min(self.id.len())],
            self.source,
            self.trap_count,
            self.silenced_until,
        )
    }
}
