//! Client side of the remote storage service.
//!
//! [`RemoteService`] builds resource URLs, attaches the bearer token and maps
//! status codes to [`TransportError`]; the bytes travel through a
//! [`Transport`], by default the blocking [`HttpTransport`].

mod http;

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::Format;
use crate::config::RemoteConfig;
use crate::store::PayloadKind;

pub use http::HttpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: token required or invalid")]
    Unauthorized,

    #[error("no credentials configured for login")]
    MissingCredentials,

    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Moves one request to the service and back.
///
/// Implementations only fail when no response was obtained; status codes are
/// interpreted by [`RemoteService`].
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Remote storage for model payloads.
///
/// When a request is rejected with 401 and credentials are configured, the
/// service logs in once and retries with the fresh token.
pub struct RemoteService<T: Transport = HttpTransport> {
    config: RemoteConfig,
    token: Mutex<Option<String>>,
    transport: T,
}

impl RemoteService<HttpTransport> {
    pub fn from_config(config: RemoteConfig) -> Self {
        let transport = HttpTransport::new(std::time::Duration::from_secs(config.timeout_secs));
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> RemoteService<T> {
    pub fn with_transport(config: RemoteConfig, transport: T) -> Self {
        let token = config.token.clone();
        Self {
            config,
            token: Mutex::new(token),
            transport,
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().expect("token lock poisoned").clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.lock().expect("token lock poisoned") = token;
    }

    /// `<base url>/<segments...>[?format=<format>]`, each segment
    /// percent-encoded.
    pub fn url(&self, segments: &[&str], format: Option<Format>) -> Result<String, TransportError> {
        let base = self.config.base_url();
        let mut url = reqwest::Url::parse(&base).map_err(|e| TransportError::Url(format!("{}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::Url(base.clone()))?
            .pop_if_empty()
            .extend(segments);
        if let Some(format) = format {
            url.query_pairs_mut().append_pair("format", format.as_str());
        }
        Ok(url.into())
    }

    // ============================================================
    // Service operations
    // ============================================================

    /// True when the service answers its health check.
    pub fn health(&self) -> Result<bool, TransportError> {
        let response = self.transport.send(self.request(Method::Get, self.url(&["health"], None)?, None))?;
        if !response.is_success() {
            return Ok(false);
        }
        let body: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        Ok(body.get("status").and_then(|s| s.as_str()) == Some("ok"))
    }

    /// Exchange the configured credentials for a token and keep it for
    /// later requests.
    pub fn login(&self) -> Result<String, TransportError> {
        let (username, password) = self
            .config
            .credentials()
            .ok_or(TransportError::MissingCredentials)?;
        let body = serde_json::to_vec(&LoginRequest { username, password })
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        let mut request = TransportRequest {
            method: Method::Post,
            url: self.url(&["login"], None)?,
            headers: Vec::new(),
            body: Some(body),
        };
        request
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));

        let response = check(self.transport.send(request)?)?;
        let login: LoginResponse = serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::InvalidResponse(format!("login response: {}", e)))?;
        tracing::debug!("Obtained a new token from {}", self.config.host);
        self.set_token(Some(login.token.clone()));
        Ok(login.token)
    }

    // ============================================================
    // Model payloads
    // ============================================================

    /// Fetch a stored payload; `None` when the service has none.
    pub fn get(
        &self,
        purpose: &str,
        kind: PayloadKind,
        format: Format,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let url = self.model_url(purpose, kind, format)?;
        match self.send_authorized(Method::Get, url, None, format) {
            Ok(response) => Ok(Some(response.body)),
            Err(TransportError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn put(
        &self,
        purpose: &str,
        kind: PayloadKind,
        format: Format,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let url = self.model_url(purpose, kind, format)?;
        self.send_authorized(Method::Put, url, Some(payload), format)?;
        Ok(())
    }

    /// Returns whether the service had anything to delete.
    pub fn delete(
        &self,
        purpose: &str,
        kind: PayloadKind,
        format: Format,
    ) -> Result<bool, TransportError> {
        let url = self.model_url(purpose, kind, format)?;
        match self.send_authorized(Method::Delete, url, None, format) {
            Ok(_) => Ok(true),
            Err(TransportError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn model_url(&self, purpose: &str, kind: PayloadKind, format: Format) -> Result<String, TransportError> {
        self.url(&["models", purpose, kind.as_str()], Some(format))
    }

    fn request(&self, method: Method, url: String, body: Option<Vec<u8>>) -> TransportRequest {
        let mut headers = Vec::new();
        if let Some(token) = self.token() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        TransportRequest {
            method,
            url,
            headers,
            body,
        }
    }

    fn send_authorized(
        &self,
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
        format: Format,
    ) -> Result<TransportResponse, TransportError> {
        let build = |service: &Self| {
            let mut request = service.request(method, url.clone(), body.clone());
            request
                .headers
                .push(("Accept".to_string(), format.content_type().to_string()));
            if request.body.is_some() {
                request
                    .headers
                    .push(("Content-Type".to_string(), format.content_type().to_string()));
            }
            request
        };

        let response = self.transport.send(build(self))?;
        if response.status == 401 && self.config.credentials().is_some() {
            tracing::debug!("{} {} rejected, refreshing token", method, url);
            self.login()?;
            return check(self.transport.send(build(self))?);
        }
        check(response)
    }
}

/// Convert error statuses into typed errors.
fn check(response: TransportResponse) -> Result<TransportResponse, TransportError> {
    if response.is_success() {
        return Ok(response);
    }
    let body = response.text();
    match response.status {
        404 => Err(TransportError::NotFound(body)),
        400 => Err(TransportError::BadRequest(body)),
        401 => Err(TransportError::Unauthorized),
        status => Err(TransportError::Server { status, body }),
    }
}
