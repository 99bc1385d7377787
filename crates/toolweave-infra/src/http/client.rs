//! `reqwest`-backed implementation of the core `HttpClient` port.

use std::time::Duration;

use futures_util::future::BoxFuture;
use toolweave_core::workflow::{HttpClient, HttpRequest, HttpResponse, StepError};

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("toolweave/", env!("CARGO_PKG_VERSION"));

/// Sends `http_request` step calls over a shared connection pool.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. one shared with the tool executor.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, StepError>> {
        Box::pin(async move {
            let method: reqwest::Method = request.method.parse().map_err(|_| {
                StepError::Configuration(format!("invalid HTTP method: {}", request.method))
            })?;

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                StepError::HttpFailed(format!("request to '{}' failed: {e}", request.url))
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                StepError::HttpFailed(format!("failed to read response body: {e}"))
            })?;

            tracing::debug!(
                method = %request.method,
                url = %request.url,
                status,
                body_len = body.len(),
                "HTTP request completed"
            );
            Ok(HttpResponse { status, body })
        })
    }
}
