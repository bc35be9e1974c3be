// Metrics API HTTP client
//
// Wraps `reqwest::Client` with base-URL joining, optional basic auth,
// and status/JSON decoding. Endpoint paths are supplied per call so the
// dashboard configuration can relocate them at runtime.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{AnalyticsSnapshot, RequestDetail, RequestQuery, RequestRecord, Resolution, StatsSnapshot};
use crate::transport::{BasicAuth, TransportConfig};

/// Endpoint paths of the metrics API, relative to the dashboard mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub stats: String,
    pub requests: String,
    pub analytics: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            stats: "/api/stats".into(),
            requests: "/api/requests".into(),
            analytics: "/api/analytics".into(),
        }
    }
}

/// HTTP client for the dashboard's metrics endpoints.
///
/// Cheap to clone. All methods return decoded payloads; non-2xx
/// responses become [`Error::Http`] carrying status code and reason.
#[derive(Debug, Clone)]
pub struct MetricsClient {
    http: reqwest::Client,
    base_url: Url,
    basic_auth: Option<BasicAuth>,
}

impl MetricsClient {
    /// Create a client for the dashboard mounted at `base_url`
    /// (e.g. `http://localhost:8000/monitor`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            basic_auth: transport.basic_auth.clone(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            basic_auth: None,
        }
    }

    /// The dashboard base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ───────────────────────────────────────────────────

    /// Get aggregate statistics.
    ///
    /// `GET {stats}`
    pub async fn get_stats(&self, endpoint: &str) -> Result<StatsSnapshot, Error> {
        let url = self.endpoint_url(endpoint)?;
        self.get(url).await
    }

    /// List recent requests, newest first.
    ///
    /// `GET {requests}?limit=..&offset=..`
    pub async fn list_requests(
        &self,
        endpoint: &str,
        query: &RequestQuery,
    ) -> Result<Vec<RequestRecord>, Error> {
        let mut url = self.endpoint_url(endpoint)?;
        url.query_pairs_mut()
            .append_pair("limit", &query.limit.to_string())
            .append_pair("offset", &query.offset.to_string());
        self.get(url).await
    }

    /// Get one request with captured headers and bodies.
    ///
    /// `GET {requests}/{id}`. The server answers `null` for unknown ids.
    pub async fn get_request(
        &self,
        endpoint: &str,
        id: i64,
    ) -> Result<Option<RequestDetail>, Error> {
        let path = format!("{}/{id}", endpoint.trim_end_matches('/'));
        let url = self.endpoint_url(&path)?;
        self.get(url).await
    }

    /// Get chart data bucketed at `resolution`.
    ///
    /// `GET {analytics}?resolution=..`
    pub async fn get_analytics(
        &self,
        endpoint: &str,
        resolution: Resolution,
    ) -> Result<AnalyticsSnapshot, Error> {
        let mut url = self.endpoint_url(endpoint)?;
        url.query_pairs_mut()
            .append_pair("resolution", resolution.as_token());
        self.get(url).await
    }

    // ── URL builders ────────────────────────────────────────────────

    /// Join an endpoint path onto the base URL, keeping any mount prefix.
    ///
    /// `http://host/monitor` + `/api/stats` -> `http://host/monitor/api/stats`
    pub(crate) fn endpoint_url(&self, endpoint: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ─────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let mut builder = self.http.get(url);
        if let Some(ref auth) = self.basic_auth {
            builder = auth.apply(builder);
        }
        let resp = builder.send().await?;

        Self::parse_response(resp).await
    }

    async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "dashboard rejected the configured credentials".into(),
            });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_owned(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> MetricsClient {
        MetricsClient::with_client(reqwest::Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn endpoint_url_keeps_mount_prefix() {
        let c = client("http://localhost:8000/monitor/");
        assert_eq!(
            c.endpoint_url("/api/stats").unwrap().as_str(),
            "http://localhost:8000/monitor/api/stats"
        );
        assert_eq!(
            c.endpoint_url("api/requests").unwrap().as_str(),
            "http://localhost:8000/monitor/api/requests"
        );
    }

    #[test]
    fn endpoint_url_at_root() {
        let c = client("http://localhost:8000");
        assert_eq!(
            c.endpoint_url("/api/analytics").unwrap().as_str(),
            "http://localhost:8000/api/analytics"
        );
    }
}
