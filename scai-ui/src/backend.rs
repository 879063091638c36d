//! Simulation backend client
//!
//! The [`Backend`] trait is the seam between the session layer and the HTTP service.
//! [`HttpBackend`] talks to the real backend with reqwest; tests substitute an
//! in-memory implementation.

use crate::error::{UiError, UiResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::StatusCode;
use scai_common::api::{
    ApiErrorBody, BaselineMetrics, PolicyPreset, RunResultResponse, StartRunRequest,
    StartRunResponse,
};
use scai_common::GeoFeatureCollection;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

const USER_AGENT: &str = concat!("scai-ui/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Whole-request limit for JSON calls; the first city network fetch can be slow
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Raw event-stream body, chunked as the transport delivers it
pub type ByteStream = BoxStream<'static, UiResult<Bytes>>;

/// Backend-assigned run identifier (the backend calls it `job_id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the session layer needs from the simulation backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /simulate`: request a new run id
    async fn start_run(&self, request: &StartRunRequest) -> UiResult<RunId>;

    /// `GET /simulate/{id}/stream`: open the push-event stream for a run
    async fn open_event_stream(&self, run_id: &RunId) -> UiResult<ByteStream>;

    /// `GET /simulate/{id}/result`: authoritative result of a finished run
    async fn fetch_run_result(&self, run_id: &RunId) -> UiResult<RunResultResponse>;

    /// `GET /city/kochi`: baseline road network
    async fn fetch_city_network(&self) -> UiResult<GeoFeatureCollection>;

    /// `GET /city/kochi/metrics`: baseline traffic summary
    async fn fetch_baseline_metrics(&self) -> UiResult<BaselineMetrics>;

    /// `GET /presets`: canned policy scenarios
    async fn fetch_presets(&self) -> UiResult<Vec<PolicyPreset>>;
}

/// reqwest-based backend client
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:8000/api`)
    ///
    /// Only a connect timeout is set on the client; JSON requests add their own
    /// whole-request timeout, the event stream has none.
    pub fn new(base_url: impl Into<String>) -> UiResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| UiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> UiResult<T> {
        let url = self.url(path);
        tracing::debug!(url = %url, "GET");

        let response = self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| UiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| UiError::Parse(format!("{}: {}", path, e)))
    }
}

/// Map non-success responses to [`UiError::Api`]
///
/// 202 Accepted is how the backend says "still running"; callers never get a body
/// for it, so it is reported as an API error too.
async fn check_status(response: reqwest::Response) -> UiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() && status != StatusCode::ACCEPTED {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiErrorBody>(&error_text)
        .map(|body| body.detail)
        .ok()
        .filter(|detail| !detail.is_empty())
        .unwrap_or(error_text);

    Err(UiError::Api(status.as_u16(), detail))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn start_run(&self, request: &StartRunRequest) -> UiResult<RunId> {
        let url = self.url("/simulate");
        tracing::debug!(url = %url, city = %request.city, "Starting simulation run");

        let response = self
            .http_client
            .post(&url)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(request)
            .send()
            .await
            .map_err(|e| UiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let body: StartRunResponse = response
            .json()
            .await
            .map_err(|e| UiError::Parse(format!("start run response: {}", e)))?;

        if body.job_id.trim().is_empty() {
            return Err(UiError::Parse("start run response has an empty job_id".to_string()));
        }

        tracing::info!(run_id = %body.job_id, status = %body.status, "Run accepted by backend");
        Ok(RunId::new(body.job_id))
    }

    async fn open_event_stream(&self, run_id: &RunId) -> UiResult<ByteStream> {
        let url = self.url(&format!("/simulate/{}/stream", run_id));
        tracing::debug!(url = %url, "Opening event stream");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| UiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UiError::Stream(e.to_string())))
            .boxed();
        Ok(stream)
    }

    async fn fetch_run_result(&self, run_id: &RunId) -> UiResult<RunResultResponse> {
        self.get_json(&format!("/simulate/{}/result", run_id)).await
    }

    async fn fetch_city_network(&self) -> UiResult<GeoFeatureCollection> {
        self.get_json("/city/kochi").await
    }

    async fn fetch_baseline_metrics(&self) -> UiResult<BaselineMetrics> {
        self.get_json("/city/kochi/metrics").await
    }

    async fn fetch_presets(&self) -> UiResult<Vec<PolicyPreset>> {
        self.get_json("/presets").await
    }
}
