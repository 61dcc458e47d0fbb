// HTTP command client
//
// Wraps `reqwest::Client` with base-URL joining, a per-request deadline
// and the device's loose JSON response envelope. The device answers either
// `{ "status": ... }` / `{ "success": ..., "data": ... }` on success or
// `{ "error": ... }` with a 4xx on failure; `ResponseEnvelope` normalizes
// all of these.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// A single request against the device's HTTP surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub method: Method,
    /// Path relative to the client's base URL, e.g. `/move/forward`.
    pub path: String,
    pub body: Option<Value>,
    /// Overrides the client's default deadline.
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            timeout: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ── Responses ────────────────────────────────────────────────────────

/// Normalized device response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    /// HTTP status code.
    pub status: u16,
    pub success: bool,
    pub data: Option<Value>,
    /// Human-readable detail: `message`, `error` or `status` from the body.
    pub message: Option<String>,
}

impl ResponseEnvelope {
    /// Interpret a raw response body.
    ///
    /// `success` comes from a boolean `success` field when present,
    /// otherwise it is "2xx and no `error` field". `data` is the `data`
    /// field when present, otherwise the whole body. A non-JSON body keeps
    /// the status-code verdict and carries no data.
    pub fn from_body(status: u16, body: &str) -> Self {
        let ok_status = (200..300).contains(&status);

        let Ok(value) = serde_json::from_str::<Value>(body) else {
            let text = body.trim();
            return Self {
                status,
                success: ok_status,
                data: None,
                message: (!text.is_empty()).then(|| text.to_owned()),
            };
        };

        let field = |key: &str| value.as_object().and_then(|obj| obj.get(key));

        let success = field("success")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| ok_status && field("error").is_none());

        let message = ["message", "error", "status"]
            .into_iter()
            .find_map(|key| field(key).and_then(Value::as_str))
            .map(str::to_owned);

        let data = Some(field("data").unwrap_or(&value).clone());

        Self {
            status,
            success,
            data,
            message,
        }
    }
}

// ── DeviceClient ─────────────────────────────────────────────────────

/// HTTP client for the device's command surface.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, transport.timeout))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, mut base_url: Url, timeout: Duration) -> Self {
        // `Url::join` replaces the last segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http,
            base_url,
            timeout,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Execute a request, bounded by its deadline (or the client default).
    ///
    /// Any HTTP status yields `Ok`; only transport failures, timeouts and
    /// bad URLs are errors.
    pub async fn execute(&self, request: &CommandRequest) -> Result<ResponseEnvelope, Error> {
        let deadline = request.timeout.unwrap_or(self.timeout);
        tokio::time::timeout(deadline, self.send(request))
            .await
            .map_err(|_| Error::timeout(deadline))?
    }

    /// Lightweight liveness probe: `GET /`.
    pub async fn probe(&self) -> Result<ResponseEnvelope, Error> {
        self.execute(&CommandRequest::get("/")).await
    }

    async fn send(&self, request: &CommandRequest) -> Result<ResponseEnvelope, Error> {
        let url = self.url(&request.path)?;
        debug!("{:?} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let resp = builder.send().await.map_err(Error::Transport)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(Error::Transport)?;

        let envelope = ResponseEnvelope::from_body(status, &body);
        if !envelope.success {
            debug!(
                status,
                message = envelope.message.as_deref().unwrap_or(""),
                "device rejected request"
            );
        }
        Ok(envelope)
    }
}
