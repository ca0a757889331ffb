//! HTTP execution with per-request cancellation and latency capture.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Method;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::telemetry::TelemetryManager;
use crate::types::Operation;

/// Which of the two clients executes a request. The subscribe client holds
/// the long-poll timeout; everything else uses the short timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Subscribe,
    NonSubscribe,
}

/// Shared HTTP layer. Clone is a cheap Arc refcount bump.
#[derive(Clone)]
pub(crate) struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    subscribe_client: reqwest::Client,
    client: reqwest::Client,
    telemetry: Arc<TelemetryManager>,
}

impl Transport {
    pub(crate) fn new(config: &Config, telemetry: Arc<TelemetryManager>) -> Result<Self, Error> {
        let subscribe_client = reqwest::Client::builder()
            .timeout(config.subscribe_request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        let client = reqwest::Client::builder()
            .timeout(config.non_subscribe_request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                subscribe_client,
                client,
                telemetry,
            }),
        })
    }

    pub(crate) fn telemetry(&self) -> &TelemetryManager {
        &self.inner.telemetry
    }

    /// Execute a request. Cancelling `token` aborts the in-flight connection
    /// and surfaces the distinguished [`Error::Cancelled`], which callers
    /// treat as a non-failure.
    pub(crate) async fn execute(
        &self,
        kind: RequestKind,
        operation: Operation,
        method: Method,
        url: Url,
        body: Option<String>,
        token: &CancellationToken,
    ) -> Result<String, Error> {
        let client = match kind {
            RequestKind::Subscribe => &self.inner.subscribe_client,
            RequestKind::NonSubscribe => &self.inner.client,
        };
        let mut request = client.request(method, url);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let started = Instant::now();
        let response = tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            response = request.send() => response?,
        };
        let status = response.status();
        let text = tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            text = response.text() => text?,
        };
        self.inner.telemetry.record(operation, started.elapsed());
        debug!(?operation, status = status.as_u16(), "request completed");

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}
