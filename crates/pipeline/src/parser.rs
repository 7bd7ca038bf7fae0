//! 트랩 레코드 파서 -- `[**]` 구분 텍스트를 [`Trap`]으로 변환
//!
//! 외부 트랩 데몬은 필드 구분자 `[**]`, v2 varbind 부구분자 `\t`를
//! 사용하는 텍스트 레코드를 기록합니다. 첫 필드는 항상 `SNMPv1` 또는
//! `SNMPv2`입니다.
//!
//! # wire 형식
//! ```text
//! SNMPv1[**]날짜[**]시각[**]출처[**]enterprise OID[**]generic[**]타입설명[**]specific[**]varbinds
//! SNMPv2[**]날짜[**]시각[**]출처[**]탭 구분 varbinds
//! ```
//!
//! varbind 텍스트 내부에 `[**]`가 나타나는 경우의 동작은 정의되지
//! 않습니다 (마지막 필드가 꼬리 전체를 가져갑니다).

use chrono::NaiveDateTime;

use trapflow_core::error::ParseError;
use trapflow_core::types::{Trap, TrapVersion};

/// 레코드 필드 구분자
pub(crate) const FIELD_DELIM: &str = "[**]";

/// v2 generic 타입이 유도되는 표준 트랩 OID 접두어
const STANDARD_TRAP_PREFIX: &str = ".1.3.6.1.6.3.1.1.5.";

/// 트랩 레코드 파서
///
/// `use_pdu_address`가 켜져 있으면 v1 트랩의 출처에도 주소 정규화를
/// 적용합니다 (v2는 항상 정규화).
pub struct TrapParser {
    use_pdu_address: bool,
}

impl TrapParser {
    /// 새 파서를 생성합니다.
    pub fn new(use_pdu_address: bool) -> Self {
        Self { use_pdu_address }
    }

    /// 논리 라인 하나를 파싱합니다.
    ///
    /// # Errors
    /// 알 수 없는 버전 태그, 필수 필드 누락, OID 부재 시 실패합니다.
    /// 호출 측은 실패를 낮은 심각도로 로그하고 해당 트랩을 버립니다.
    pub fn parse(&self, line: &str) -> Result<Trap, ParseError> {
        let (tag, rest) = match line.split_once(FIELD_DELIM) {
            Some(pair) => pair,
            None => {
                return Err(ParseError::UnknownDialect(
                    line.chars().take(16).collect(),
                ));
            }
        };

        let version =
            TrapVersion::from_tag(tag).ok_or_else(|| ParseError::UnknownDialect(tag.to_owned()))?;

        match version {
            TrapVersion::V1 => self.parse_v1(rest, line),
            TrapVersion::V2 => self.parse_v2(rest, line),
        }
    }

    /// v1 레코드 본문을 파싱합니다 (버전 필드 이후 8필드).
    fn parse_v1(&self, body: &str, raw: &str) -> Result<Trap, ParseError> {
        let parts: Vec<&str> = body.splitn(8, FIELD_DELIM).collect();
        if parts.len() < 7 {
            const FIELDS: [&str; 7] =
                ["date", "time", "source", "oid", "type", "type_desc", "value"];
            return Err(ParseError::MissingField {
                field: FIELDS[parts.len().min(6)].to_owned(),
            });
        }

        let raw_source = parts[2];
        let type_desc = parts[5];

        let mut oid = parts[3].trim();
        if oid.is_empty() || oid == "." {
            oid = type_desc.trim();
        }
        if oid.is_empty() || oid == "." {
            return Err(ParseError::MissingOid {
                addr: raw_source.to_owned(),
            });
        }

        let source = if self.use_pdu_address {
            normalize_source(raw_source)
        } else {
            raw_source.trim().to_owned()
        };

        let timestamp = format!("{} {}", parts[0], parts[1]);
        Ok(Trap {
            version: TrapVersion::V1,
            received_unix: timestamp_to_unix(&timestamp),
            timestamp,
            source,
            oid: oid.to_owned(),
            generic_type: parts[4].trim().parse().unwrap_or(0),
            value: sanitize_value(parts[6]),
            type_desc: type_desc.to_owned(),
            custom_payload: parts.get(7).copied().unwrap_or("").to_owned(),
            raw_tail: raw.to_owned(),
        })
    }

    /// v2 레코드 본문을 파싱합니다 (버전 필드 이후 4필드).
    fn parse_v2(&self, body: &str, raw: &str) -> Result<Trap, ParseError> {
        let parts: Vec<&str> = body.splitn(4, FIELD_DELIM).collect();
        if parts.len() < 4 {
            const FIELDS: [&str; 4] = ["date", "time", "source", "data"];
            return Err(ParseError::MissingField {
                field: FIELDS[parts.len().min(3)].to_owned(),
            });
        }

        let raw_source = parts[2];

        // 첫 varbind(sysUpTime)는 버리고 두 번째에서 snmpTrapOID.0 값을 취함
        let mut binds = parts[3].split('\t');
        let _uptime = binds.next();
        let oid_field = binds.next().ok_or_else(|| ParseError::MissingOid {
            addr: raw_source.to_owned(),
        })?;

        let oid = strip_oid_prefix(oid_field).trim();
        if oid.is_empty() {
            return Err(ParseError::MissingOid {
                addr: raw_source.to_owned(),
            });
        }

        let custom_payload = binds.collect::<Vec<_>>().join("\t");

        let timestamp = format!("{} {}", parts[0], parts[1]);
        Ok(Trap {
            version: TrapVersion::V2,
            received_unix: timestamp_to_unix(&timestamp),
            timestamp,
            source: normalize_source(raw_source),
            generic_type: derive_generic_type(oid),
            oid: oid.to_owned(),
            value: String::new(),
            type_desc: String::new(),
            custom_payload,
            raw_tail: raw.to_owned(),
        })
    }
}

/// 생산자용 저비용 출처 추출 -- 4번째 구분 필드를 그대로 돌려줍니다.
///
/// 스톰 카운터와 출처 락의 키로 사용됩니다. 정규화는 워커의 전체
/// 파싱에서만 수행되므로, 락 획득과 해제가 항상 같은 키를 사용합니다.
pub(crate) fn raw_source_field(line: &str) -> Option<&str> {
    line.split(FIELD_DELIM).nth(3)
}

/// 출처 주소 정규화
///
/// `TCP:`/`UDP:` 접두어, ` -> 목적지` 꼬리, 둘러싼 대괄호,
/// `:포트` 접미어(음수 포트 포함)를 제거하고 주소/호스트명만 남깁니다.
fn normalize_source(raw: &str) -> String {
    let mut s = raw.trim();

    for prefix in ["TCP:", "UDP:"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start();
            break;
        }
    }

    if let Some(idx) = s.find("->") {
        s = s[..idx].trim_end();
    }

    if let Some(rest) = s.strip_prefix('[') {
        s = match rest.find(']') {
            Some(idx) => &rest[..idx],
            None => rest,
        };
    } else if let Some(idx) = s.rfind(':') {
        let port = &s[idx + 1..];
        let digits = port.strip_prefix('-').unwrap_or(port);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            s = &s[..idx];
        }
    }

    s.to_owned()
}

/// v2 varbind 필드에서 `... = OID: ` 접두어를 제거합니다.
fn strip_oid_prefix(field: &str) -> &str {
    match field.find("OID: ") {
        Some(idx) => &field[idx + "OID: ".len()..],
        None => field,
    }
}

/// v2 OID에서 generic 타입을 유도합니다.
///
/// 표준 트랩 OID `.1.3.6.1.6.3.1.1.5.N` (N=1..5)은 `N-1`,
/// 그 외는 enterprise-specific(6)으로 취급합니다.
fn derive_generic_type(oid: &str) -> i32 {
    if let Some(suffix) = oid.strip_prefix(STANDARD_TRAP_PREFIX)
        && let Ok(n) = suffix.parse::<u32>()
        && (1..=5).contains(&n)
    {
        return (n - 1) as i32;
    }
    6
}

/// specific 값에서 제어 문자를 제거합니다.
fn sanitize_value(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// 데몬이 기록한 `YYYY-MM-DD HH:MM:SS`를 unix 초로 변환합니다.
///
/// 형식이 맞지 않으면 수신 시점의 시각을 사용합니다.
fn timestamp_to_unix(timestamp: &str) -> u64 {
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc().timestamp().max(0) as u64)
        .unwrap_or_else(|_| crate::unix_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TrapParser {
        TrapParser::new(false)
    }

    #[test]
    fn parse_v1_basic() {
        let line = "SNMPv1[**]2024-01-15[**]10:20:30[**]192.0.2.1[**].1.3.6.1.4.1.2021[**]6[**]Link down[**]3[**].1.3.6.1.2.1.2.2.1.1.2 = INTEGER: 2";
        let trap = parser().parse(line).unwrap();

        assert_eq!(trap.version, TrapVersion::V1);
        assert_eq!(trap.timestamp, "2024-01-15 10:20:30");
        assert_eq!(trap.source, "192.0.2.1");
        assert_eq!(trap.oid, ".1.3.6.1.4.1.2021");
        assert_eq!(trap.generic_type, 6);
        assert_eq!(trap.type_desc, "Link down");
        assert_eq!(trap.value, "3");
        assert!(trap.custom_payload.contains("INTEGER: 2"));
        assert_eq!(trap.raw_tail, line);
    }

    #[test]
    fn parse_v1_oid_falls_back_to_type_desc() {
        let line = "SNMPv1[**]2024-01-15[**]10:20:30[**]192.0.2.1[**].[**]6[**].1.3.6.1.4.1.9[**]3[**]data";
        let trap = parser().parse(line).unwrap();
        assert_eq!(trap.oid, ".1.3.6.1.4.1.9");
    }

    #[test]
    fn parse_v1_without_any_oid_fails() {
        let line = "SNMPv1[**]2024-01-15[**]10:20:30[**]192.0.2.1[**].[**]6[**][**]3[**]data";
        let result = parser().parse(line);
        assert!(matches!(result, Err(ParseError::MissingOid { .. })));
    }

    #[test]
    fn parse_v1_sanitizes_control_chars_in_value() {
        let line = "SNMPv1[**]2024-01-15[**]10:20:30[**]192.0.2.1[**].1.3[**]6[**]d[**]3\u{7}\u{1b}[**]data";
        let trap = parser().parse(line).unwrap();
        assert_eq!(trap.value, "3");
    }

    #[test]
    fn parse_v1_lenient_generic_type() {
        let line = "SNMPv1[**]2024-01-15[**]10:20:30[**]192.0.2.1[**].1.3[**]junk[**]d[**]3[**]data";
        let trap = parser().parse(line).unwrap();
        assert_eq!(trap.generic_type, 0);
    }

    #[test]
    fn parse_v1_source_kept_raw_by_default() {
        let line = "SNMPv1[**]2024-01-15[**]10:20:30[**]UDP: [192.0.2.5]:162[**].1.3[**]6[**]d[**]1[**]x";
        let trap = parser().parse(line).unwrap();
        assert_eq!(trap.source, "UDP: [192.0.2.5]:162");
    }

    #[test]
    fn parse_v1_source_normalized_with_pdu_address() {
        let line = "SNMPv1[**]2024-01-15[**]10:20:30[**]UDP: [192.0.2.5]:162[**].1.3[**]6[**]d[**]1[**]x";
        let trap = TrapParser::new(true).parse(line).unwrap();
        assert_eq!(trap.source, "192.0.2.5");
    }

    #[test]
    fn parse_v2_basic() {
        let line = "SNMPv2[**]2024-01-15[**]10:20:30[**]UDP: [10.0.0.1]:162[**]x\t.1.3.6.1.6.3.1.1.4.1.0 = OID: .1.3.6.1.6.3.1.1.5.2\ty";
        let trap = parser().parse(line).unwrap();

        assert_eq!(trap.version, TrapVersion::V2);
        assert_eq!(trap.timestamp, "2024-01-15 10:20:30");
        assert_eq!(trap.source, "10.0.0.1");
        assert_eq!(trap.oid, ".1.3.6.1.6.3.1.1.5.2");
        assert_eq!(trap.generic_type, 1);
        assert_eq!(trap.custom_payload, "y");
        assert_eq!(trap.value, "");
        assert_eq!(trap.type_desc, "");
    }

    #[test]
    fn parse_v2_without_oid_prefix() {
        let line = "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x\t.1.3.6.1.4.1.2021.13\ta\tb";
        let trap = parser().parse(line).unwrap();
        assert_eq!(trap.oid, ".1.3.6.1.4.1.2021.13");
        assert_eq!(trap.generic_type, 6);
        assert_eq!(trap.custom_payload, "a\tb");
    }

    #[test]
    fn parse_v2_missing_oid_field_fails() {
        let line = "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]only-uptime";
        let result = parser().parse(line);
        assert!(matches!(result, Err(ParseError::MissingOid { .. })));
    }

    #[test]
    fn parse_v2_missing_data_field_fails() {
        let line = "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1";
        let result = parser().parse(line);
        assert!(matches!(result, Err(ParseError::MissingField { .. })));
    }

    #[test]
    fn parse_unknown_dialect_fails() {
        let result = parser().parse("SNMPv3[**]2024-01-15[**]10:20:30[**]x[**]y");
        assert!(matches!(result, Err(ParseError::UnknownDialect(_))));

        let result = parser().parse("garbage line without delimiter");
        assert!(matches!(result, Err(ParseError::UnknownDialect(_))));
    }

    #[test]
    fn generic_type_derivation_table() {
        assert_eq!(derive_generic_type(".1.3.6.1.6.3.1.1.5.1"), 0);
        assert_eq!(derive_generic_type(".1.3.6.1.6.3.1.1.5.3"), 2);
        assert_eq!(derive_generic_type(".1.3.6.1.6.3.1.1.5.5"), 4);
        assert_eq!(derive_generic_type(".1.3.6.1.6.3.1.1.5.6"), 6);
        assert_eq!(derive_generic_type(".1.3.6.1.6.3.1.1.5.0"), 6);
        assert_eq!(derive_generic_type(".1.3.6.1.4.1.2021.13"), 6);
        assert_eq!(derive_generic_type(""), 6);
    }

    #[test]
    fn source_normalization_variants() {
        assert_eq!(
            normalize_source("UDP: [192.0.2.5]:-1234 -> [198.51.100.1]:162"),
            "192.0.2.5"
        );
        assert_eq!(normalize_source("UDP: [10.0.0.1]:162"), "10.0.0.1");
        assert_eq!(normalize_source("TCP: 192.0.2.7:161"), "192.0.2.7");
        assert_eq!(normalize_source("[192.0.2.8]"), "192.0.2.8");
        assert_eq!(normalize_source("host.example.com:162"), "host.example.com");
        assert_eq!(normalize_source("host.example.com"), "host.example.com");
        assert_eq!(normalize_source("192.0.2.9"), "192.0.2.9");
    }

    #[test]
    fn raw_source_field_extraction() {
        let line = "SNMPv2[**]2024-01-15[**]10:20:30[**]UDP: [10.0.0.1]:162[**]data";
        assert_eq!(raw_source_field(line), Some("UDP: [10.0.0.1]:162"));
        assert_eq!(raw_source_field("SNMPv2[**]only[**]three"), None);
    }

    #[test]
    fn timestamp_derives_unix_seconds() {
        let line = "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x\t.1.3\ty";
        let trap = parser().parse(line).unwrap();
        // 2024-01-15 10:20:30 UTC
        assert_eq!(trap.received_unix, 1_705_314_030);
    }

    #[test]
    fn invalid_timestamp_falls_back_to_now() {
        let line = "SNMPv2[**]not-a-date[**]bad[**]10.0.0.1[**]x\t.1.3\ty";
        let trap = parser().parse(line).unwrap();
        assert!(trap.received_unix > 1_700_000_000);
        assert_eq!(trap.timestamp, "not-a-date bad");
    }

    #[test]
    fn multiline_payload_preserved() {
        let line = "SNMPv2[**]2024-01-15[**]10:20:30[**]10.0.0.1[**]x\t.1.3\tline one\nline two";
        let trap = parser().parse(line).unwrap();
        assert!(trap.custom_payload.contains("line one\nline two"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_input_does_not_panic(line in ".{0,500}") {
                let _ = TrapParser::new(false).parse(&line);
                let _ = TrapParser::new(true).parse(&line);
            }

            #[test]
            fn normalize_arbitrary_source_does_not_panic(raw in ".{0,200}") {
                let _ = normalize_source(&raw);
            }

            #[test]
            fn standard_trap_oids_map_into_range(n in 1u32..=5) {
                let oid = format!(".1.3.6.1.6.3.1.1.5.{n}");
                let generic = derive_generic_type(&oid);
                prop_assert!((0..=4).contains(&generic));
                prop_assert_eq!(generic, (n - 1) as i32);
            }
        }
    }
}
