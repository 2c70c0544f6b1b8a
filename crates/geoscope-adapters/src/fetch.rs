//! Bounded-timeout HTTP gateway shared by every adapter.
//!
//! The gateway never retries; mirror rotation and pauses live in the
//! adapters. The whole exchange (send and body read) runs under one
//! deadline.

use geoscope_core::text::sanitize_upstream_text;
use geoscope_core::{FailureKind, SourceId, SourceResult};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);
/// Overpass and WMS queries.
pub const HEAVY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {host} timed out after {}s", .after.as_secs_f32())]
    Timeout { host: String, after: Duration },

    #[error("request to {host} failed: {message}")]
    Transport { host: String, message: String },

    #[error("{host} answered HTTP {status}: {body}")]
    Status {
        host: String,
        status: u16,
        body: String,
    },

    #[error("could not decode response from {host}: {message}")]
    Decode { host: String, message: String },
}

impl FetchError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout { .. } => FailureKind::Timeout,
            FetchError::Status { status: 404, .. } => FailureKind::NotFound,
            FetchError::Transport { .. } | FetchError::Status { .. } => FailureKind::Upstream,
            FetchError::Decode { .. } => FailureKind::InvalidResponse,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Status { status: 429, .. })
    }

    /// Tag this error as a failed result for `source`.
    pub fn into_result<T>(self, source: SourceId) -> SourceResult<T> {
        SourceResult::failed(source, self.failure_kind(), self.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Execute `request` under `timeout`. Non-success statuses become
    /// [`FetchError::Status`].
    pub async fn fetch_with_timeout(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let request = request.build().map_err(|e| FetchError::Transport {
            host: "(unbuilt request)".to_string(),
            message: e.to_string(),
        })?;
        let host = request
            .url()
            .host_str()
            .map(|h| match request.url().port() {
                Some(port) => format!("{h}:{port}"),
                None => h.to_string(),
            })
            .unwrap_or_else(|| request.url().to_string());

        let exchange = async {
            let response = self.client.execute(request).await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Err(_) => Err(FetchError::Timeout {
                host,
                after: timeout,
            }),
            Ok(Err(err)) => Err(FetchError::Transport {
                host,
                message: err.without_url().to_string(),
            }),
            Ok(Ok((status, body))) if status.is_success() => Ok(body),
            Ok(Ok((status, body))) => Err(FetchError::Status {
                host,
                status: status.as_u16(),
                body: sanitize_upstream_text(&body),
            }),
        }
    }

    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<String, FetchError> {
        self.fetch_with_timeout(self.client.get(url).query(query), timeout)
            .await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, FetchError> {
        let body = self.get_text(url, query, timeout).await?;
        decode_json(url, &body)
    }

    pub async fn post_form_text(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<String, FetchError> {
        self.fetch_with_timeout(self.client.post(url).form(form), timeout)
            .await
    }
}

pub fn decode_json<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Decode {
        host: url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string()),
        message: e.to_string(),
    })
}
