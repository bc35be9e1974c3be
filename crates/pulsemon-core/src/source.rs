// ── Metrics source abstraction ──
//
// The controller fetches through this trait so it can be driven by the
// real HTTP client or by an in-process fake.

use std::future::Future;
use std::sync::Arc;

use pulsemon_api::{
    AnalyticsSnapshot, MetricsClient, RequestDetail, RequestQuery, RequestRecord, Resolution,
    StatsSnapshot,
};

/// Anything that can answer the dashboard's four read queries.
pub trait MetricsSource: Send + Sync + 'static {
    fn stats(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<StatsSnapshot, pulsemon_api::Error>> + Send;

    fn requests(
        &self,
        endpoint: &str,
        query: &RequestQuery,
    ) -> impl Future<Output = Result<Vec<RequestRecord>, pulsemon_api::Error>> + Send;

    fn request_detail(
        &self,
        endpoint: &str,
        id: i64,
    ) -> impl Future<Output = Result<Option<RequestDetail>, pulsemon_api::Error>> + Send;

    fn analytics(
        &self,
        endpoint: &str,
        resolution: Resolution,
    ) -> impl Future<Output = Result<AnalyticsSnapshot, pulsemon_api::Error>> + Send;
}

impl MetricsSource for MetricsClient {
    async fn stats(&self, endpoint: &str) -> Result<StatsSnapshot, pulsemon_api::Error> {
        self.get_stats(endpoint).await
    }

    async fn requests(
        &self,
        endpoint: &str,
        query: &RequestQuery,
    ) -> Result<Vec<RequestRecord>, pulsemon_api::Error> {
        self.list_requests(endpoint, query).await
    }

    async fn request_detail(
        &self,
        endpoint: &str,
        id: i64,
    ) -> Result<Option<RequestDetail>, pulsemon_api::Error> {
        self.get_request(endpoint, id).await
    }

    async fn analytics(
        &self,
        endpoint: &str,
        resolution: Resolution,
    ) -> Result<AnalyticsSnapshot, pulsemon_api::Error> {
        self.get_analytics(endpoint, resolution).await
    }
}

impl<T: MetricsSource> MetricsSource for Arc<T> {
    fn stats(
        &self,
        endpoint: &str,
    ) -> impl Future<Output = Result<StatsSnapshot, pulsemon_api::Error>> + Send {
        (**self).stats(endpoint)
    }

    fn requests(
        &self,
        endpoint: &str,
        query: &RequestQuery,
    ) -> impl Future<Output = Result<Vec<RequestRecord>, pulsemon_api::Error>> + Send {
        (**self).requests(endpoint, query)
    }

    fn request_detail(
        &self,
        endpoint: &str,
        id: i64,
    ) -> impl Future<Output = Result<Option<RequestDetail>, pulsemon_api::Error>> + Send {
        (**self).request_detail(endpoint, id)
    }

    fn analytics(
        &self,
        endpoint: &str,
        resolution: Resolution,
    ) -> impl Future<Output = Result<AnalyticsSnapshot, pulsemon_api::Error>> + Send {
        (**self).analytics(endpoint, resolution)
    }
}
