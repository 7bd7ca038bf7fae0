//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 트랩 데몬이 기록한 텍스트 레코드를 파싱한 결과([`Trap`])와
//! 저장소에 기록되는 행([`TrapRow`])을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 트랩 wire 형식 방언
///
/// 외부 트랩 데몬은 레코드의 첫 필드에 방언을 기록합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrapVersion {
    /// SNMPv1 트랩 (enterprise OID + generic/specific 타입)
    V1,
    /// SNMPv2c 알림 (snmpTrapOID.0 기반)
    V2,
}

impl TrapVersion {
    /// 레코드 첫 필드의 버전 태그를 파싱합니다.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "SNMPv1" => Some(Self::V1),
            "SNMPv2" => Some(Self::V2),
            _ => None,
        }
    }
}

impl fmt::Display for TrapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "SNMPv1"),
            Self::V2 => write!(f, "SNMPv2"),
        }
    }
}

/// 파싱된 트랩 레코드
///
/// 파싱 이후에는 변경되지 않습니다. `timestamp`는 데몬이 기록한
/// 문자열을 그대로 보존하며, `received_unix`는 저장/비교용 정수입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trap {
    /// wire 형식 방언
    pub version: TrapVersion,
    /// 데몬이 기록한 수신 시각 (`YYYY-MM-DD HH:MM:SS`, 원본 그대로)
    pub timestamp: String,
    /// `timestamp`에서 유도한 unix 초 (파싱 실패 시 수신 시점 시각)
    pub received_unix: u64,
    /// 정규화된 출처 주소/호스트명
    pub source: String,
    /// 점 표기 OID (v1: enterprise OID, v2: snmpTrapOID.0 값)
    pub oid: String,
    /// generic 타입 (0..6, v2는 표준 OID 접두어에서 유도)
    pub generic_type: i32,
    /// v1 specific 값 (v2에서는 빈 문자열)
    pub value: String,
    /// v1 타입 설명 (v2에서는 빈 문자열)
    pub type_desc: String,
    /// 나머지 구분자 데이터 꼬리 (직렬화된 varbind 목록)
    pub custom_payload: String,
    /// 필터 매칭 대상이 되는 원본 논리 라인
    pub raw_tail: String,
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} source={} oid={} type={}",
            self.version, self.timestamp, self.source, self.oid, self.generic_type,
        )
    }
}

/// 트랩 저장소 행
///
/// [`TrapStore`](crate::pipeline::TrapStore)에 전달되는 행 형식입니다.
/// 컬럼 구성은 외부 스키마와 1:1로 대응합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapRow {
    /// 데몬이 기록한 수신 시각 문자열
    pub timestamp: String,
    /// 정규화된 출처
    pub source: String,
    /// 점 표기 OID
    pub oid: String,
    /// generic 타입
    pub trap_type: i32,
    /// v1 specific 값
    pub value: String,
    /// varbind 데이터 꼬리
    pub oid_custom: String,
    /// 예약 컬럼 (항상 빈 문자열)
    pub value_custom: String,
    /// 예약 컬럼 (항상 빈 문자열)
    pub type_custom: String,
    /// 행 삽입 시점 unix 초
    pub utimestamp: u64,
}

impl TrapRow {
    /// 파싱된 트랩에서 저장소 행을 구성합니다.
    pub fn from_trap(trap: &Trap, utimestamp: u64) -> Self {
        Self {
            timestamp: trap.timestamp.clone(),
            source: trap.source.clone(),
            oid: trap.oid.clone(),
            trap_type: trap.generic_type,
            value: trap.value.clone(),
            oid_custom: trap.custom_payload.clone(),
            value_custom: String::new(),
            type_custom: String::new(),
            utimestamp,
        }
    }
}

impl fmt::Display for TrapRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} oid={} type={}",
            self.timestamp, self.source, self.oid, self.trap_type,
        )
    }
}
