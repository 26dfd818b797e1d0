//! Bearer-token authentication for the storage service.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// How long a login token stays valid unless configured otherwise.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Security configuration loaded from environment variables.
///
/// Authentication is enabled as soon as a static API key or login
/// credentials are configured.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Static bearer token (from MODELTREE_API_KEY)
    pub api_key: Option<String>,
    /// Accepted login (from MODELTREE_API_USER / MODELTREE_API_PASSWORD)
    pub credentials: Option<(String, String)>,
    /// Allowed CORS origins (from MODELTREE_CORS_ORIGINS, comma-separated)
    pub cors_origins: Option<Vec<String>>,
    /// Lifetime of login tokens (from MODELTREE_SESSION_TTL_SECS)
    pub session_ttl: Duration,
    /// Issue time per login token
    sessions: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            credentials: None,
            cors_origins: None,
            session_ttl: DEFAULT_SESSION_TTL,
            sessions: Arc::default(),
        }
    }
}

impl SecurityConfig {
    /// Load security configuration from environment variables.
    pub fn from_env() -> Self {
        let api_key = std::env::var("MODELTREE_API_KEY").ok();
        let credentials = match (
            std::env::var("MODELTREE_API_USER"),
            std::env::var("MODELTREE_API_PASSWORD"),
        ) {
            (Ok(user), Ok(password)) => Some((user, password)),
            _ => None,
        };
        let cors_origins = std::env::var("MODELTREE_CORS_ORIGINS")
            .ok()
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect());
        let session_ttl = std::env::var("MODELTREE_SESSION_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SESSION_TTL);

        Self {
            api_key,
            credentials,
            cors_origins,
            session_ttl,
            sessions: Arc::default(),
        }
    }

    /// Create a config with no authentication (for local development/testing).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create a config with a static token.
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Create a config that issues tokens on login.
    pub fn with_credentials(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((user.into(), password.into())),
            ..Self::default()
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some() || self.credentials.is_some()
    }

    /// Check a login and issue a session token. Expired tokens are
    /// dropped on every login.
    pub fn login(&self, user: &str, password: &str) -> Option<String> {
        let (expected_user, expected_password) = self.credentials.as_ref()?;
        if user != expected_user || password != expected_password {
            return None;
        }
        let token = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        sessions.retain(|_, issued| now.duration_since(*issued) < self.session_ttl);
        sessions.insert(token.clone(), now);
        Some(token)
    }

    pub fn accepts(&self, token: &str) -> bool {
        if self.api_key.as_deref() == Some(token) {
            return true;
        }
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .get(token)
            .is_some_and(|issued| issued.elapsed() < self.session_ttl)
    }

    /// Number of login tokens currently held.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }
}

/// Authentication middleware that checks for a valid bearer token.
pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if !config.is_enabled() {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header.map(|h| h.strip_prefix("Bearer ")) {
        Some(Some(token)) if config.accepts(token) => Ok(next.run(request).await),
        Some(Some(_)) => {
            tracing::warn!("Invalid token provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        Some(None) => {
            tracing::warn!("Invalid Authorization header format");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
