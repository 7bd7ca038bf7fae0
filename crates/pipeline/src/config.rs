//! 트랩 파이프라인 설정
//!
//! [`ConsoleConfig`]는 core의
//! [`TrapConsoleConfig`](trapflow_core::config::TrapConsoleConfig)와
//! [`ForwardConfig`](trapflow_core::config::ForwardConfig)를 합쳐
//! 파이프라인이 런타임에 사용하는 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use trapflow_core::config::TrapflowConfig;
//! use trapflow_pipeline::config::ConsoleConfig;
//!
//! let core_config = TrapflowConfig::default();
//! let config = ConsoleConfig::from_core(&core_config.console, &core_config.forward);
//! ```

use serde::{Deserialize, Serialize};

use trapflow_core::config::{ForwardConfig, TrapConsoleConfig};

use crate::error::TrapPipelineError;

/// 트랩 파이프라인 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// 기본 트랩 로그 경로
    pub log_file: String,
    /// 보조 트랩 로그 경로 (선택)
    pub extra_log_file: Option<String>,
    /// 생산자 틱 주기 (초, console 전용 값이 이미 반영된 최종 주기)
    pub tick_secs: u64,
    /// 소비자 워커 수
    pub worker_threads: usize,
    /// 스톰 임계치 (0이면 비활성화)
    pub storm_threshold: u32,
    /// 스톰 윈도우 길이 (초)
    pub storm_window_secs: u64,
    /// 침묵 기간 (초, 0이면 윈도우 길이를 사용)
    pub silence_secs: u64,
    /// 출처별 직렬화 여부
    pub serialize_by_source: bool,
    /// v1 트랩에도 출처 정규화 적용
    pub use_pdu_address: bool,
    /// 행 삽입 후 워커 대기 시간 (초)
    pub insert_delay_secs: u64,
    /// 하류 재전송 설정
    pub forward: ForwardConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let core = TrapConsoleConfig::default();
        Self {
            log_file: core.log_file,
            extra_log_file: None,
            tick_secs: core.tick_secs,
            worker_threads: core.worker_threads,
            storm_threshold: core.storm_threshold,
            storm_window_secs: core.storm_window_secs,
            silence_secs: core.silence_secs,
            serialize_by_source: core.serialize_by_source,
            use_pdu_address: core.use_pdu_address,
            insert_delay_secs: core.insert_delay_secs,
            forward: ForwardConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(console: &TrapConsoleConfig, forward: &ForwardConfig) -> Self {
        Self {
            log_file: console.log_file.clone(),
            extra_log_file: console.extra_log_file.clone(),
            tick_secs: console.effective_tick_secs(),
            worker_threads: console.worker_threads,
            storm_threshold: console.storm_threshold,
            storm_window_secs: console.storm_window_secs,
            silence_secs: console.silence_secs,
            serialize_by_source: console.serialize_by_source,
            use_pdu_address: console.use_pdu_address,
            insert_delay_secs: console.insert_delay_secs,
            forward: forward.clone(),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TrapPipelineError> {
        const MAX_TICK_SECS: u64 = 3600;
        const MAX_WORKERS: usize = 64;

        if self.log_file.is_empty() {
            return Err(TrapPipelineError::Config {
                field: "log_file".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.tick_secs == 0 || self.tick_secs > MAX_TICK_SECS {
            return Err(TrapPipelineError::Config {
                field: "tick_secs".to_owned(),
                reason: format!("must be 1-{MAX_TICK_SECS}"),
            });
        }

        if self.worker_threads == 0 || self.worker_threads > MAX_WORKERS {
            return Err(TrapPipelineError::Config {
                field: "worker_threads".to_owned(),
                reason: format!("must be 1-{MAX_WORKERS}"),
            });
        }

        if self.storm_threshold > 0 && self.storm_window_secs == 0 {
            return Err(TrapPipelineError::Config {
                field: "storm_window_secs".to_owned(),
                reason: "must be greater than 0 when storm protection is enabled".to_owned(),
            });
        }

        if self.forward.enabled && self.forward.target.is_empty() {
            return Err(TrapPipelineError::Config {
                field: "forward.target".to_owned(),
                reason: "must not be empty when forwarding is enabled".to_owned(),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct ConsoleConfigBuilder {
    config: ConsoleConfig,
}

impl ConsoleConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 트랩 로그 경로를 설정합니다.
    pub fn log_file(mut self, path: impl Into<String>) -> Self {
        self.config.log_file = path.into();
        self
    }

    /// 보조 트랩 로그 경로를 설정합니다.
    pub fn extra_log_file(mut self, path: impl Into<String>) -> Self {
        self.config.extra_log_file = Some(path.into());
        self
    }

    /// 틱 주기(초)를 설정합니다.
    pub fn tick_secs(mut self, secs: u64) -> Self {
        self.config.tick_secs = secs;
        self
    }

    /// 워커 수를 설정합니다.
    pub fn worker_threads(mut self, workers: usize) -> Self {
        self.config.worker_threads = workers;
        self
    }

    /// 스톰 보호 파라미터를 설정합니다.
    pub fn storm(mut self, threshold: u32, window_secs: u64, silence_secs: u64) -> Self {
        self.config.storm_threshold = threshold;
        self.config.storm_window_secs = window_secs;
        self.config.silence_secs = silence_secs;
        self
    }

    /// 출처별 직렬화를 설정합니다.
    pub fn serialize_by_source(mut self, enabled: bool) -> Self {
        self.config.serialize_by_source = enabled;
        self
    }

    /// v1 출처 정규화를 설정합니다.
    pub fn use_pdu_address(mut self, enabled: bool) -> Self {
        self.config.use_pdu_address = enabled;
        self
    }

    /// 행 삽입 후 대기 시간(초)을 설정합니다.
    pub fn insert_delay_secs(mut self, secs: u64) -> Self {
        self.config.insert_delay_secs = secs;
        self
    }

    /// 하류 재전송 설정을 지정합니다.
    pub fn forward(mut self, forward: ForwardConfig) -> Self {
        self.config.forward = forward;
        self
    }

    /// 설정을 검증하고 `ConsoleConfig`를 생성합니다.
    pub fn build(self) -> Result<ConsoleConfig, TrapPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ConsoleConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_resolves_console_tick() {
        let console = TrapConsoleConfig {
            tick_secs: 10,
            console_tick_secs: Some(1),
            ..Default::default()
        };
        let config = ConsoleConfig::from_core(&console, &ForwardConfig::default());
        assert_eq!(config.tick_secs, 1);
    }

    #[test]
    fn from_core_preserves_values() {
        let console = TrapConsoleConfig {
            log_file: "/tmp/traps.log".to_owned(),
            extra_log_file: Some("/tmp/traps2.log".to_owned()),
            storm_threshold: 7,
            serialize_by_source: true,
            ..Default::default()
        };
        let config = ConsoleConfig::from_core(&console, &ForwardConfig::default());
        assert_eq!(config.log_file, "/tmp/traps.log");
        assert_eq!(config.extra_log_file.as_deref(), Some("/tmp/traps2.log"));
        assert_eq!(config.storm_threshold, 7);
        assert!(config.serialize_by_source);
    }

    #[test]
    fn validate_rejects_empty_log_file() {
        let config = ConsoleConfig {
            log_file: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_tick() {
        let config = ConsoleConfig {
            tick_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = ConsoleConfigBuilder::new()
            .log_file("/tmp/traps.log")
            .worker_threads(2)
            .storm(5, 60, 30)
            .serialize_by_source(true)
            .build()
            .unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.storm_threshold, 5);
        assert!(config.serialize_by_source);
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let result = ConsoleConfigBuilder::new().worker_threads(0).build();
        assert!(result.is_err());
    }
}
