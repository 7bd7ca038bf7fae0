//! 하류 트랩 재전송 -- snmptrap 호환 바이너리 호출
//!
//! 파싱된 트랩을 설정된 버전(v1/v2c/v3)의 외부 `snmptrap` 호환
//! 명령 인자로 변환하여 fire-and-forget으로 실행합니다. 실행 실패는
//! 로그만 남기며 파이프라인을 막지 않습니다.
//!
//! varbind 페이로드는 `(oid, 타입 태그, 값)` 3요소를 스캔하여
//! 하류 단축 표기 `oid <문자> 값`으로 변환됩니다.

use std::process::Stdio;

use metrics::counter;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use trapflow_core::config::ForwardConfig;
use trapflow_core::metrics::FORWARD_FAILURES_TOTAL;
use trapflow_core::types::Trap;

use crate::error::TrapPipelineError;

/// varbind 헤더 패턴: `<oid> = <타입 태그>:`
///
/// 긴 태그(`HEX STRING` 등)를 먼저 두어 우선 매칭되도록 합니다.
const VARBIND_HEADER: &str = r"(\S+)\s*=\s*(INTEGER|UNSIGNED|COUNTER32|HEX STRING|DECIMAL STRING|STRING|NULLOBJ|OBJID|TIMETICKS|IPADDRESS|BITS):";

/// varbind 3요소
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Varbind {
    /// 점 표기 OID
    pub oid: String,
    /// 타입 태그 (예: "TIMETICKS")
    pub type_tag: String,
    /// 값 텍스트
    pub value: String,
}

/// 타입 태그를 하류 단축 문자로 변환합니다.
fn type_letter(tag: &str) -> Option<&'static str> {
    match tag {
        "INTEGER" => Some("i"),
        "UNSIGNED" => Some("u"),
        "COUNTER32" => Some("c"),
        "STRING" => Some("s"),
        "HEX STRING" => Some("x"),
        "DECIMAL STRING" => Some("d"),
        "NULLOBJ" => Some("n"),
        "OBJID" => Some("o"),
        "TIMETICKS" => Some("t"),
        "IPADDRESS" => Some("a"),
        "BITS" => Some("b"),
        _ => None,
    }
}

/// 하류 트랩 재전송기
pub struct TrapForwarder {
    config: ForwardConfig,
    header: Regex,
}

impl TrapForwarder {
    /// 새 재전송기를 생성합니다.
    pub fn new(config: ForwardConfig) -> Result<Self, TrapPipelineError> {
        let header = Regex::new(VARBIND_HEADER)?;
        Ok(Self { config, header })
    }

    /// varbind 페이로드에서 `(oid, 태그, 값)` 3요소를 스캔합니다.
    ///
    /// 값은 현재 헤더의 끝부터 다음 헤더의 시작(또는 페이로드 끝)
    /// 까지의 텍스트입니다.
    pub fn parse_varbinds(&self, payload: &str) -> Vec<Varbind> {
        let headers: Vec<_> = self.header.captures_iter(payload).collect();

        headers
            .iter()
            .enumerate()
            .filter_map(|(i, caps)| {
                let whole = caps.get(0)?;
                let value_start = whole.end();
                let value_end = headers
                    .get(i + 1)
                    .and_then(|next| next.get(0))
                    .map_or(payload.len(), |m| m.start());
                Some(Varbind {
                    oid: caps.get(1)?.as_str().to_owned(),
                    type_tag: caps.get(2)?.as_str().to_owned(),
                    value: payload[value_start..value_end].trim().to_owned(),
                })
            })
            .collect()
    }

    /// 설정된 버전에 맞는 전체 명령 인자를 구성합니다.
    pub fn build_args(&self, trap: &Trap) -> Vec<String> {
        let generic_type = trap.generic_type.to_string();

        let base: Vec<&str> = match self.config.version.as_str() {
            "3" => vec![
                "-v",
                "3",
                "-u",
                self.config.security_user.as_str(),
                "-l",
                self.config.security_level.as_str(),
                "-a",
                self.config.auth_protocol.as_str(),
                "-A",
                self.config.auth_password.as_str(),
                "-x",
                self.config.priv_protocol.as_str(),
                "-X",
                self.config.priv_password.as_str(),
                self.config.target.as_str(),
                "",
                trap.oid.as_str(),
            ],
            "1" => vec![
                "-v",
                "1",
                "-c",
                self.config.community.as_str(),
                self.config.target.as_str(),
                trap.oid.as_str(),
                "",
                generic_type.as_str(),
                trap.value.as_str(),
                "",
            ],
            _ => vec![
                "-v",
                "2c",
                "-c",
                self.config.community.as_str(),
                self.config.target.as_str(),
                "",
                trap.oid.as_str(),
            ],
        };

        let mut args: Vec<String> = base.into_iter().map(str::to_owned).collect();

        for varbind in self.parse_varbinds(&trap.custom_payload) {
            let Some(letter) = type_letter(&varbind.type_tag) else {
                continue;
            };
            let value = if varbind.type_tag == "INTEGER" {
                varbind
                    .value
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect()
            } else {
                varbind.value
            };
            args.push(varbind.oid);
            args.push(letter.to_owned());
            args.push(value);
        }

        args
    }

    /// 트랩을 하류로 재전송합니다 (fire-and-forget).
    ///
    /// 실행 실패와 0이 아닌 종료 코드는 로그만 남깁니다.
    pub async fn forward(&self, trap: &Trap) {
        let args = self.build_args(trap);
        debug!(
            binary = %self.config.binary,
            target = %self.config.target,
            oid = %trap.oid,
            "forwarding trap downstream"
        );

        match Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(mut child) => {
                let binary = self.config.binary.clone();
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            counter!(FORWARD_FAILURES_TOTAL).increment(1);
                            warn!(%binary, %status, "trap forwarder exited with failure");
                        }
                        Err(e) => {
                            counter!(FORWARD_FAILURES_TOTAL).increment(1);
                            warn!(%binary, error = %e, "failed to wait on trap forwarder");
                        }
                        _ => {}
                    }
                });
            }
            Err(e) => {
                counter!(FORWARD_FAILURES_TOTAL).increment(1);
                warn!(
                    binary = %self.config.binary,
                    error = %e,
                    "failed to spawn trap forwarder"
                );
            }
        }
    }
}
