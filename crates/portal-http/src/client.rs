//! The HTTP client.

use chrono::Local;
use portal_core::{FALLBACK_MESSAGE, PortalError, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use crate::{
    download::{Download, filename_from_disposition, synthesize_filename},
    envelope::Envelope,
    session::{Anonymous, PK_USER_HEADER, SESSION_ID_HEADER, SessionSource},
};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend base URL, e.g. `https://portal.example/api`.
    pub base_url: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// Where the session headers come from.
    pub session: Arc<dyn SessionSource>,
}

impl ClientConfig {
    /// Creates a configuration for `base_url` with no session.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            session: Arc::new(Anonymous),
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the session source.
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn SessionSource>) -> Self {
        self.session = session;
        self
    }
}

/// A successful, decoded response.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: u16,
    /// Backend message, if any.
    pub message: Option<String>,
    /// Payload, if any.
    pub data: Option<Value>,
}

/// Client for the portal backend.
///
/// Cookies are kept across requests and every request carries the session
/// headers when a session record is available.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionSource>,
}

impl ApiClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    /// Returns [`PortalError::Unexpected`] if the underlying HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.timeout)
            .build()
            .map_err(|e| PortalError::Unexpected(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session: config.session,
        })
    }

    /// Returns the backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match self.session.current() {
            Some(session) => builder
                .header(SESSION_ID_HEADER, session.session_id)
                .header(PK_USER_HEADER, session.pk_user.to_string()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let bytes = response.bytes().await.unwrap_or_default();
        let envelope = Envelope::from_slice(&bytes).unwrap_or_default();
        log_failure(status, &envelope);
        Err(envelope.into_error(status.as_u16()))
    }

    /// Sends a JSON request and decodes the envelope.
    ///
    /// # Errors
    /// - [`PortalError::Network`] when no response was received (offline, DNS,
    ///   timeout)
    /// - [`PortalError::Http`] for a non-2xx status or a `success: false`
    ///   envelope
    /// - [`PortalError::Unexpected`] for anything else, such as a body that is
    ///   not JSON
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let mut builder = self.builder(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = self.send(builder).await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(classify)?;

        if bytes.is_empty() {
            debug!(status, "Empty response body");
            return Ok(ApiResponse {
                status,
                message: None,
                data: None,
            });
        }

        let body: Value =
            serde_json::from_slice(&bytes).map_err(|e| PortalError::Unexpected(e.to_string()))?;
        let envelope = Envelope::from_value(body);

        if envelope.success == Some(false) {
            let status = envelope.status.unwrap_or(status);
            warn!(status, message = ?envelope.message, "Backend reported failure");
            return Err(envelope.into_error(status));
        }

        debug!(status, "Request succeeded");
        Ok(ApiResponse {
            status,
            message: envelope.message,
            data: envelope.data,
        })
    }

    /// GETs `path` and returns the envelope's `data`.
    ///
    /// # Errors
    /// As [`request`](Self::request), plus [`PortalError::Unexpected`] carrying
    /// the backend message when the envelope has no data.
    pub async fn get(&self, path: &str) -> Result<Value> {
        Self::require_data(self.request(Method::GET, path, None).await?)
    }

    /// POSTs `body` to `path` and returns the envelope's `data`.
    ///
    /// # Errors
    /// As [`get`](Self::get).
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        Self::require_data(self.request(Method::POST, path, Some(body)).await?)
    }

    fn require_data(response: ApiResponse) -> Result<Value> {
        response.data.ok_or_else(|| {
            PortalError::Unexpected(
                response
                    .message
                    .unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
            )
        })
    }

    /// Downloads a binary export.
    ///
    /// The filename comes from `Content-Disposition`, or is synthesized as
    /// `<stem>_<today>.<ext>` from the content type.
    ///
    /// # Errors
    /// Same failure classes as [`request`](Self::request).
    #[instrument(skip(self))]
    pub async fn download(&self, path: &str, stem: &str) -> Result<Download> {
        let response = self
            .send(self.builder(Method::GET, path).header(header::ACCEPT, "*/*"))
            .await?;

        let header_text = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let content_type = header_text(header::CONTENT_TYPE);
        let filename = header_text(header::CONTENT_DISPOSITION)
            .and_then(|d| filename_from_disposition(&d))
            .unwrap_or_else(|| {
                synthesize_filename(stem, Local::now().date_naive(), content_type.as_deref())
            });

        let bytes = response.bytes().await.map_err(classify)?;
        debug!(filename = %filename, bytes = bytes.len(), "Downloaded file");
        Ok(Download {
            bytes: bytes.to_vec(),
            filename,
            content_type,
        })
    }
}

/// Maps a transport error to the normalized error shape.
fn classify(e: reqwest::Error) -> PortalError {
    if e.is_builder() {
        PortalError::Unexpected(e.to_string())
    } else if e.is_timeout() {
        PortalError::Network(format!("Request timed out: {e}"))
    } else {
        PortalError::Network(e.to_string())
    }
}

fn log_failure(status: StatusCode, envelope: &Envelope) {
    let message = envelope
        .message
        .as_deref()
        .or(envelope.body_message.as_deref());
    match status {
        // Redirecting to the login page is left to the caller.
        StatusCode::UNAUTHORIZED => warn!(status = 401, "Authentication required"),
        StatusCode::FORBIDDEN => warn!(status = 403, "Access denied"),
        StatusCode::NOT_FOUND => warn!(status = 404, "Resource not found"),
        s if s.is_server_error() => error!(status = s.as_u16(), message = ?message, "Server error"),
        s => debug!(status = s.as_u16(), message = ?message, "Request failed"),
    }
}
