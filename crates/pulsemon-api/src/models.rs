// Metrics API response types
//
// Wire models for the dashboard's JSON endpoints. The server emits raw
// SQLite rows for request records, so most fields are optional or
// defaulted; unknown columns are ignored.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Stats ────────────────────────────────────────────────────────────

/// Aggregate counters from `GET /api/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default)]
    pub total_requests: u64,
    /// Mean response time in milliseconds, rounded to two decimals.
    #[serde(default)]
    pub avg_response_time: f64,
    /// Status code (as a string key, e.g. `"200"`) to count.
    #[serde(default)]
    pub status_codes: BTreeMap<String, u64>,
    #[serde(default)]
    pub error_count: u64,
}

impl StatsSnapshot {
    /// Fraction of observed requests that recorded an error, in `0.0..=1.0`.
    #[allow(clippy::as_conversions, clippy::cast_precision_loss)]
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.total_requests as f64
    }

    /// Number of responses with a status code in the given class (2 for 2xx, etc.)
    pub fn count_for_class(&self, class: u16) -> u64 {
        self.status_codes
            .iter()
            .filter(|(code, _)| code.parse::<u16>().is_ok_and(|c| c / 100 == class))
            .map(|(_, count)| count)
            .sum()
    }
}

// ── Requests ─────────────────────────────────────────────────────────

/// One observed HTTP transaction, as listed by `GET /api/requests`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    #[serde(default)]
    pub id: i64,
    /// Unix timestamp (seconds, fractional) at which the request started.
    pub timestamp: f64,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query_params: Option<String>,
    pub status_code: u16,
    /// Response time in milliseconds.
    pub response_time: f64,
    #[serde(default)]
    pub request_size: u64,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Server-rendered wall-clock time (`"03:04:05 PM"`).
    #[serde(default)]
    pub formatted_time: Option<String>,
}

impl RequestRecord {
    /// The request start time as a UTC datetime.
    #[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis((self.timestamp * 1000.0).round() as i64)
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// Full request row from `GET /api/requests/{id}`, with captured
/// headers, bodies, and error details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub record: RequestRecord,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub response_headers: Option<serde_json::Value>,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub response_body: Option<String>,
    #[serde(default)]
    pub error_info: Option<serde_json::Value>,
}

/// Pagination parameters for `GET /api/requests`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuery {
    pub limit: u32,
    pub offset: u32,
}

impl Default for RequestQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

impl RequestQuery {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Query for a 1-based page. Page 0 is treated as page 1.
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            limit,
            offset: page.max(1).saturating_sub(1).saturating_mul(limit),
        }
    }

    /// Number of pages needed to show `total` records at this page size.
    pub fn total_pages(&self, total: u64) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        total.div_ceil(u64::from(self.limit))
    }
}

// ── Analytics ────────────────────────────────────────────────────────

/// Time-bucket resolution accepted by `GET /api/analytics`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum Resolution {
    #[default]
    #[serde(rename = "30s")]
    #[strum(serialize = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    #[strum(serialize = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    #[strum(serialize = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    #[strum(serialize = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    #[strum(serialize = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    #[strum(serialize = "1d")]
    OneDay,
}

impl Resolution {
    /// Width of a single time bucket.
    pub fn bucket(self) -> Duration {
        Duration::from_secs(match self {
            Self::ThirtySeconds => 30,
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::ThirtyMinutes => 1_800,
            Self::OneHour => 3_600,
            Self::OneDay => 86_400,
        })
    }

    /// How far back the server looks when bucketing at this resolution.
    pub fn window(self) -> Duration {
        Duration::from_secs(match self {
            Self::ThirtySeconds | Self::OneMinute => 3_600,
            Self::FiveMinutes => 7_200,
            Self::FifteenMinutes => 21_600,
            Self::ThirtyMinutes => 43_200,
            Self::OneHour => 86_400,
            Self::OneDay => 604_800,
        })
    }

    /// Wire token (`"30s"`, `"1h"`, ...).
    pub fn as_token(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub time: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyBucket {
    pub range: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub path: String,
    pub count: u64,
    pub avg_time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTrend {
    pub date: String,
    pub status_code: u16,
    pub count: u64,
}

/// Chart data from `GET /api/analytics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    #[serde(default)]
    pub requests_over_time: Vec<TimeBucket>,
    /// Echoed resolution token. Kept as a string since the server echoes
    /// whatever was requested.
    pub resolution: String,
    #[serde(default)]
    pub response_time_distribution: Vec<LatencyBucket>,
    #[serde(default)]
    pub top_endpoints: Vec<EndpointSummary>,
    #[serde(default)]
    pub status_trends: Vec<StatusTrend>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_record_ignores_raw_row_columns() {
        let row = json!({
            "id": 7,
            "timestamp": 1_718_447_400.25,
            "method": "GET",
            "path": "/users/123",
            "query_params": "",
            "status_code": 200,
            "response_time": 12.5,
            "request_size": 0,
            "response_size": 42,
            "client_ip": "127.0.0.1",
            "user_agent": "curl/8.0",
            "headers": "{\"host\": \"localhost\"}",
            "error_info": null,
            "created_at": "2024-06-15 10:30:00",
            "formatted_time": "10:30:00 AM"
        });
        let record: RequestRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.path, "/users/123");
        assert_eq!(record.response_size, 42);
        assert!(!record.is_error());
        assert_eq!(
            record.observed_at().unwrap().timestamp_millis(),
            1_718_447_400_250
        );
    }

    #[test]
    fn request_detail_flattens_record() {
        let row = json!({
            "id": 9,
            "timestamp": 1.0,
            "method": "POST",
            "path": "/users",
            "status_code": 500,
            "response_time": 3.0,
            "headers": {"content-type": "application/json"},
            "error_info": {"type": "ValueError", "message": "boom"}
        });
        let detail: RequestDetail = serde_json::from_value(row).unwrap();
        assert_eq!(detail.record.method, "POST");
        assert!(detail.record.is_error());
        assert_eq!(detail.error_info.unwrap()["type"], "ValueError");
    }

    #[test]
    fn stats_helpers() {
        let stats = StatsSnapshot {
            total_requests: 10,
            avg_response_time: 4.2,
            status_codes: BTreeMap::from([
                ("200".into(), 6),
                ("201".into(), 1),
                ("404".into(), 2),
                ("500".into(), 1),
            ]),
            error_count: 1,
        };
        assert!((stats.error_rate() - 0.1).abs() < f64::EPSILON);
        assert_eq!(stats.count_for_class(2), 7);
        assert_eq!(stats.count_for_class(4), 2);
        assert_eq!(StatsSnapshot::default().error_rate(), 0.0);
    }

    #[test]
    fn pagination_math() {
        assert_eq!(RequestQuery::page(1, 20), RequestQuery::new(20, 0));
        assert_eq!(RequestQuery::page(3, 20), RequestQuery::new(20, 40));
        assert_eq!(RequestQuery::page(0, 20), RequestQuery::new(20, 0));
        assert_eq!(RequestQuery::default().total_pages(41), 3);
        assert_eq!(RequestQuery::new(0, 0).total_pages(41), 0);
    }

    #[test]
    fn resolution_tokens_and_windows() {
        assert_eq!("5m".parse::<Resolution>().unwrap(), Resolution::FiveMinutes);
        assert_eq!(Resolution::OneDay.as_token(), "1d");
        assert_eq!(Resolution::default().to_string(), "30s");
        assert_eq!(Resolution::OneHour.bucket(), Duration::from_secs(3_600));
        assert_eq!(Resolution::FifteenMinutes.window(), Duration::from_secs(21_600));
        assert!("2w".parse::<Resolution>().is_err());
    }
}
