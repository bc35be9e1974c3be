// pulsemon-api: Async Rust client for the request-metrics dashboard API

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::{Endpoints, MetricsClient};
pub use error::Error;
pub use models::{
    AnalyticsSnapshot, EndpointSummary, LatencyBucket, RequestDetail, RequestQuery,
    RequestRecord, Resolution, StatsSnapshot, StatusTrend, TimeBucket,
};
pub use transport::{BasicAuth, TlsMode, TransportConfig};
