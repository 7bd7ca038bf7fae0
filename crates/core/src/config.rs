//! 설정 관리 -- trapflow.toml 파싱 및 검증
//!
//! 섹션별 구조체([`GeneralConfig`], [`TrapConsoleConfig`], [`ForwardConfig`])로
//! 구성되며, 모든 필드에 serde 기본값이 있어 부분 설정 파일도 허용됩니다.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// trapflow 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrapflowConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 트랩 콘솔(수집 파이프라인) 설정
    #[serde(default)]
    pub console: TrapConsoleConfig,
    /// 하류 트랩 재전송 설정
    #[serde(default)]
    pub forward: ForwardConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 트랩 콘솔 설정
///
/// 외부 트랩 데몬이 기록하는 로그 파일과 수집 동작을 제어합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConsoleConfig {
    /// 기본 트랩 로그 경로
    pub log_file: String,
    /// 보조 트랩 로그 경로 (선택)
    pub extra_log_file: Option<String>,
    /// 생산자 틱 주기 (초)
    pub tick_secs: u64,
    /// 콘솔 전용 틱 주기 (초, 설정 시 `tick_secs`보다 우선)
    pub console_tick_secs: Option<u64>,
    /// 소비자 워커 수
    pub worker_threads: usize,
    /// 스톰 임계치 (윈도우당 출처별 허용 트랩 수, 0이면 비활성화)
    pub storm_threshold: u32,
    /// 스톰 윈도우 길이 (초)
    pub storm_window_secs: u64,
    /// 침묵 기간 (초, 0이면 윈도우 길이를 사용)
    pub silence_secs: u64,
    /// 출처별 직렬화 (동일 출처 트랩을 한 번에 한 워커만 처리)
    pub serialize_by_source: bool,
    /// v1 트랩에도 출처 주소 정규화를 적용
    pub use_pdu_address: bool,
    /// 행 삽입 후 워커 대기 시간 (초, DB 부하 완화용)
    pub insert_delay_secs: u64,
}

impl Default for TrapConsoleConfig {
    fn default() -> Self {
        Self {
            log_file: "/var/log/trapflow/snmptrapd.log".to_owned(),
            extra_log_file: None,
            tick_secs: 2,
            console_tick_secs: None,
            worker_threads: 4,
            storm_threshold: 0,
            storm_window_secs: 60,
            silence_secs: 0,
            serialize_by_source: false,
            use_pdu_address: false,
            insert_delay_secs: 0,
        }
    }
}

impl TrapConsoleConfig {
    /// 실제 적용되는 틱 주기를 반환합니다.
    pub fn effective_tick_secs(&self) -> u64 {
        self.console_tick_secs.unwrap_or(self.tick_secs)
    }
}

/// 하류 트랩 재전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// 재전송 활성화 여부
    pub enabled: bool,
    /// SNMP 버전 ("1", "2c", "3")
    pub version: String,
    /// 하류 수신자 주소
    pub target: String,
    /// 커뮤니티 문자열 (v1/v2c)
    pub community: String,
    /// 보안 사용자 (v3)
    pub security_user: String,
    /// 보안 수준 (v3: noAuthNoPriv, authNoPriv, authPriv)
    pub security_level: String,
    /// 인증 프로토콜 (v3: MD5, SHA)
    pub auth_protocol: String,
    /// 인증 비밀번호 (v3)
    pub auth_password: String,
    /// 암호화 프로토콜 (v3: DES, AES)
    pub priv_protocol: String,
    /// 암호화 비밀번호 (v3)
    pub priv_password: String,
    /// 실행할 snmptrap 호환 바이너리
    pub binary: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            version: "2c".to_owned(),
            target: String::new(),
            community: "public".to_owned(),
            security_user: String::new(),
            security_level: "noAuthNoPriv".to_owned(),
            auth_protocol: "MD5".to_owned(),
            auth_password: String::new(),
            priv_protocol: "DES".to_owned(),
            priv_password: String::new(),
            binary: "snmptrap".to_owned(),
        }
    }
}

impl TrapflowConfig {
    /// TOML 설정 파일을 로드하고 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Malformed {
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX_TICK_SECS: u64 = 3600;
        const MAX_WORKERS: usize = 64;

        match self.general.log_format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::Rejected {
                    field: "general.log_format".to_owned(),
                    reason: format!("'{other}' is not one of: json, pretty"),
                });
            }
        }

        if self.console.log_file.is_empty() {
            return Err(ConfigError::Rejected {
                field: "console.log_file".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        let tick = self.console.effective_tick_secs();
        if tick == 0 || tick > MAX_TICK_SECS {
            return Err(ConfigError::Rejected {
                field: "console.tick_secs".to_owned(),
                reason: format!("must be 1-{MAX_TICK_SECS}"),
            });
        }

        if self.console.worker_threads == 0 || self.console.worker_threads > MAX_WORKERS {
            return Err(ConfigError::Rejected {
                field: "console.worker_threads".to_owned(),
                reason: format!("must be 1-{MAX_WORKERS}"),
            });
        }

        if self.console.storm_threshold > 0 && self.console.storm_window_secs == 0 {
            return Err(ConfigError::Rejected {
                field: "console.storm_window_secs".to_owned(),
                reason: "must be greater than 0 when storm protection is enabled".to_owned(),
            });
        }

        if self.forward.enabled {
            match self.forward.version.as_str() {
                "1" | "2c" | "3" => {}
                other => {
                    return Err(ConfigError::Rejected {
                        field: "forward.version".to_owned(),
                        reason: format!("'{other}' is not one of: 1, 2c, 3"),
                    });
                }
            }
            if self.forward.target.is_empty() {
                return Err(ConfigError::Rejected {
                    field: "forward.target".to_owned(),
                    reason: "must not be empty when forwarding is enabled".to_owned(),
                });
            }
        }

        Ok(())
    }
}
