//! Log line decoder
//!
//! Maps one raw dnsmasq/Pi-hole log line to a structured [`DnsEvent`].
//! Pure and stateless apart from the compiled patterns; safe to call
//! concurrently and idempotent on the same input.

use chrono::{Datelike, DateTime, Duration, Local, LocalResult, NaiveDateTime, TimeZone};
use regex::Regex;
use thiserror::Error;

/// One decoded DNS query occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsEvent {
    /// Seconds since epoch, from the line's syslog timestamp.
    pub timestamp: i64,
    /// Source address of the querying client. Blocked lines in the
    /// upstream grammar do not carry one.
    pub client: Option<String>,
    /// Queried domain, lowercase-normalized.
    pub domain: String,
    /// Query type. Blocked lines do not carry one.
    pub query_type: Option<QueryType>,
    pub outcome: QueryOutcome,
    /// Response latency in milliseconds. The upstream line grammar never
    /// supplies this; the column exists for schema stability.
    pub response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    A,
    Aaaa,
    Ptr,
    Other,
}

impl QueryType {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "A" => Self::A,
            "AAAA" => Self::Aaaa,
            "PTR" => Self::Ptr,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Ptr => "PTR",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Allowed,
    Blocked,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked => "blocked",
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

/// A line that could not be mapped to an event. The offending line is
/// preserved for diagnostics; decode failures never halt the pipeline.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized line shape: {line:?}")]
    UnrecognizedShape { line: String },

    #[error("invalid timestamp {value:?} in line: {line:?}")]
    InvalidTimestamp { value: String, line: String },

    #[error("missing field {field:?} in line: {line:?}")]
    MissingField { field: &'static str, line: String },
}

/// Decoder for the fixed set of recognized line shapes.
///
/// Two shapes are recognized, matching what the upstream resolver writes:
///
/// ```text
/// Aug  7 12:34:56 dnsmasq[123]: query[A] example.com from 192.168.1.10
/// Aug  7 12:34:57 dnsmasq[123]: gravity blocked ads.example.com is 0.0.0.0
/// ```
pub struct LineDecoder {
    query_re: Regex,
    blocked_re: Regex,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            query_re: Regex::new(
                r"(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}).*query\[(\w+)\]\s+(\S+)\s+from\s+(\S+)",
            )
            .expect("query pattern is valid"),
            blocked_re: Regex::new(
                r"(\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}).*(?:gravity blocked|config blocked)\s+(\S+)",
            )
            .expect("blocked pattern is valid"),
        }
    }

    /// Decode one line, without trailing-newline assumptions.
    pub fn decode(&self, line: &str) -> Result<DnsEvent, DecodeError> {
        self.decode_at(line, Local::now())
    }

    fn decode_at(&self, line: &str, now: DateTime<Local>) -> Result<DnsEvent, DecodeError> {
        if let Some(caps) = self.query_re.captures(line) {
            let stamp = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let timestamp = parse_syslog_timestamp(stamp, now).ok_or_else(|| {
                DecodeError::InvalidTimestamp {
                    value: stamp.to_string(),
                    line: line.to_string(),
                }
            })?;
            let domain = normalize_domain(caps.get(3).map(|m| m.as_str()).unwrap_or_default())
                .ok_or_else(|| DecodeError::MissingField {
                    field: "domain",
                    line: line.to_string(),
                })?;

            return Ok(DnsEvent {
                timestamp,
                client: Some(caps[4].to_string()),
                domain,
                query_type: Some(QueryType::parse(&caps[2])),
                outcome: QueryOutcome::Allowed,
                response_time_ms: None,
            });
        }

        if let Some(caps) = self.blocked_re.captures(line) {
            let stamp = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let timestamp = parse_syslog_timestamp(stamp, now).ok_or_else(|| {
                DecodeError::InvalidTimestamp {
                    value: stamp.to_string(),
                    line: line.to_string(),
                }
            })?;
            let domain = normalize_domain(caps.get(2).map(|m| m.as_str()).unwrap_or_default())
                .ok_or_else(|| DecodeError::MissingField {
                    field: "domain",
                    line: line.to_string(),
                })?;

            return Ok(DnsEvent {
                timestamp,
                client: None,
                domain,
                query_type: None,
                outcome: QueryOutcome::Blocked,
                response_time_ms: None,
            });
        }

        Err(DecodeError::UnrecognizedShape {
            line: line.to_string(),
        })
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase and strip a single trailing dot. Returns None when nothing
/// remains (a bare root query carries no domain name worth aggregating).
fn normalize_domain(raw: &str) -> Option<String> {
    let normalized = raw.strip_suffix('.').unwrap_or(raw).to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Convert a syslog timestamp (`Mmm dd HH:MM:SS`, no year) to epoch
/// seconds in local time. The current year is assumed; a result more than
/// a day in the future is re-interpreted as last year (rollover around
/// January 1st).
fn parse_syslog_timestamp(stamp: &str, now: DateTime<Local>) -> Option<i64> {
    // Collapse the variable day padding ("Aug  7" vs "Aug 17").
    let normalized = stamp.split_whitespace().collect::<Vec<_>>().join(" ");

    let parse_with_year = |year: i32| -> Option<DateTime<Local>> {
        let ndt =
            NaiveDateTime::parse_from_str(&format!("{year} {normalized}"), "%Y %b %d %H:%M:%S")
                .ok()?;
        match Local.from_local_datetime(&ndt) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => None,
        }
    };

    let dt = parse_with_year(now.year())?;
    if dt > now + Duration::days(1) {
        return parse_with_year(now.year() - 1).map(|dt| dt.timestamp());
    }
    Some(dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_now() -> DateTime<Local> {
        let ndt = NaiveDate::from_ymd_opt(2025, 8, 7)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        Local.from_local_datetime(&ndt).single().unwrap()
    }

    fn expected_ts(month: u32, day: u32, h: u32, m: u32, s: u32) -> i64 {
        let ndt = NaiveDate::from_ymd_opt(2025, month, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap();
        Local.from_local_datetime(&ndt).single().unwrap().timestamp()
    }

    #[test]
    fn decodes_query_line() {
        let decoder = LineDecoder::new();
        let line = "Aug  7 12:34:56 dnsmasq[1234]: query[A] Example.COM from 192.168.1.10";

        let event = decoder.decode_at(line, fixed_now()).unwrap();
        assert_eq!(event.timestamp, expected_ts(8, 7, 12, 34, 56));
        assert_eq!(event.client.as_deref(), Some("192.168.1.10"));
        assert_eq!(event.domain, "example.com");
        assert_eq!(event.query_type, Some(QueryType::A));
        assert_eq!(event.outcome, QueryOutcome::Allowed);
        assert_eq!(event.response_time_ms, None);
    }

    #[test]
    fn decodes_blocked_line_without_client() {
        let decoder = LineDecoder::new();
        let line = "Aug  7 12:35:01 dnsmasq[1234]: gravity blocked ads.tracker.net is 0.0.0.0";

        let event = decoder.decode_at(line, fixed_now()).unwrap();
        assert_eq!(event.timestamp, expected_ts(8, 7, 12, 35, 1));
        assert_eq!(event.client, None);
        assert_eq!(event.domain, "ads.tracker.net");
        assert_eq!(event.query_type, None);
        assert_eq!(event.outcome, QueryOutcome::Blocked);
    }

    #[test]
    fn decodes_config_blocked_variant() {
        let decoder = LineDecoder::new();
        let line = "Aug  7 12:35:02 dnsmasq[1234]: config blocked bad.example.org is NXDOMAIN";

        let event = decoder.decode_at(line, fixed_now()).unwrap();
        assert_eq!(event.outcome, QueryOutcome::Blocked);
        assert_eq!(event.domain, "bad.example.org");
    }

    #[test]
    fn query_type_mapping() {
        assert_eq!(QueryType::parse("A"), QueryType::A);
        assert_eq!(QueryType::parse("AAAA"), QueryType::Aaaa);
        assert_eq!(QueryType::parse("ptr"), QueryType::Ptr);
        assert_eq!(QueryType::parse("HTTPS"), QueryType::Other);
        assert_eq!(QueryType::parse("TXT"), QueryType::Other);
    }

    #[test]
    fn round_trips_semantic_content() {
        let decoder = LineDecoder::new();
        let cases = [
            ("host1.lan", "AAAA", "10.0.0.2", 9, 1, 0),
            ("cdn.example.net", "A", "10.0.0.3", 23, 59, 59),
            ("4.3.2.1.in-addr.arpa", "PTR", "fe80::1", 0, 0, 1),
        ];

        for (domain, qtype, client, h, m, s) in cases {
            let line = format!(
                "Aug  7 {h:02}:{m:02}:{s:02} dnsmasq[99]: query[{qtype}] {domain} from {client}"
            );
            let event = decoder.decode_at(&line, fixed_now()).unwrap();
            assert_eq!(event.domain, domain);
            assert_eq!(event.client.as_deref(), Some(client));
            assert_eq!(event.query_type.unwrap().as_str(), qtype);
            assert_eq!(event.timestamp, expected_ts(8, 7, h, m, s));
        }
    }

    #[test]
    fn malformed_lines_fail_without_panicking() {
        let decoder = LineDecoder::new();
        let lines = [
            "",
            "garbage",
            "Aug  7 12:34:56 dnsmasq[1]: reply example.com is 1.2.3.4",
            "query[A] example.com from 192.168.1.10", // no timestamp
            "Aug  7 12:34 dnsmasq[1]: query[A] x.com from 1.2.3.4", // truncated stamp
            "\u{fffd}\u{fffd}\u{fffd}",
        ];

        for line in lines {
            assert!(
                matches!(
                    decoder.decode_at(line, fixed_now()),
                    Err(DecodeError::UnrecognizedShape { .. })
                ),
                "expected shape failure for {line:?}"
            );
        }
    }

    #[test]
    fn invalid_timestamp_is_a_decode_failure() {
        let decoder = LineDecoder::new();
        // Matches the shape pattern but names a day that does not exist.
        let line = "Feb 30 12:34:56 dnsmasq[1]: query[A] example.com from 192.168.1.10";
        assert!(matches!(
            decoder.decode_at(line, fixed_now()),
            Err(DecodeError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn root_query_is_missing_domain() {
        let decoder = LineDecoder::new();
        let line = "Aug  7 12:34:56 dnsmasq[1]: query[NS] . from 192.168.1.10";
        assert!(matches!(
            decoder.decode_at(line, fixed_now()),
            Err(DecodeError::MissingField {
                field: "domain",
                ..
            })
        ));
    }

    #[test]
    fn year_rollover_lands_in_previous_year() {
        // A December stamp decoded in early January belongs to last year.
        let ndt = NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let january = Local.from_local_datetime(&ndt).single().unwrap();

        let decoder = LineDecoder::new();
        let line = "Dec 31 23:59:00 dnsmasq[1]: query[A] example.com from 10.0.0.1";
        let event = decoder.decode_at(line, january).unwrap();

        let expected = NaiveDate::from_ymd_opt(2025, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        assert_eq!(
            event.timestamp,
            Local.from_local_datetime(&expected).single().unwrap().timestamp()
        );
    }

    #[test]
    fn decode_is_idempotent() {
        let decoder = LineDecoder::new();
        let line = "Aug  7 12:34:56 dnsmasq[1]: query[A] example.com from 10.0.0.1";
        let now = fixed_now();
        assert_eq!(
            decoder.decode_at(line, now).unwrap(),
            decoder.decode_at(line, now).unwrap()
        );
    }
}
