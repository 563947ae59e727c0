//! Token store and credential exchange.
//!
//! [`TokenStore`] holds the session's access token, identity token and
//! username. The session is authenticated exactly when an access token is
//! present. Requests pick up the bearer token from the store at send time.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};

use crate::error::{Result, VantiqError};
use crate::models::{AuthTokens, ErrorDetail, VantiqResponse};

/// Path of the credential exchange endpoint, relative to the server URL.
pub(crate) const AUTHENTICATE_PATH: &str = "/authenticate";

/// Path of the token refresh endpoint, relative to the server URL.
pub(crate) const REFRESH_PATH: &str = "/authenticate/refresh";

#[derive(Debug, Default, Clone)]
struct Tokens {
    access_token: Option<String>,
    id_token: Option<String>,
    username: Option<String>,
}

/// Session credentials, shared by the REST layer and the subscriber
/// transport.
///
/// All three fields are independently optional. Reads never block on a
/// network call.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<Tokens>,
}

impl TokenStore {
    pub fn new(access_token: Option<String>, username: Option<String>) -> Self {
        Self {
            inner: RwLock::new(Tokens {
                access_token,
                id_token: None,
                username,
            }),
        }
    }

    // A poisoned lock still holds consistent strings; keep serving them.
    fn read(&self) -> RwLockReadGuard<'_, Tokens> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tokens> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().access_token.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn id_token(&self) -> Option<String> {
        self.read().id_token.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.read().username.clone()
    }

    pub fn set_username(&self, username: Option<String>) {
        self.write().username = username;
    }

    /// Install an externally obtained access token.
    ///
    /// The identity token is dropped: it only becomes known again after a
    /// refresh or authenticate round trip.
    pub fn set_access_token(&self, token: impl Into<String>) {
        let mut tokens = self.write();
        tokens.access_token = Some(token.into());
        tokens.id_token = None;
    }

    /// Store the result of a successful credential exchange.
    pub(crate) fn store(&self, tokens: AuthTokens, username: Option<&str>) {
        let mut guard = self.write();
        guard.access_token = Some(tokens.access_token);
        guard.id_token = tokens.id_token;
        if let Some(username) = username {
            guard.username = Some(username.to_string());
        }
    }

    /// Clear all three fields in one step.
    pub fn clear(&self) {
        *self.write() = Tokens::default();
    }

    /// Attach `Authorization: Bearer <access token>` when authenticated.
    pub(crate) fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// `Basic <base64(username:password)>` per RFC 7617.
pub(crate) fn basic_credentials(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    format!("Basic {}", general_purpose::STANDARD.encode(credentials.as_bytes()))
}

/// Exchange a username and password for a token pair.
///
/// The username is sent as given; the server decides how it compares names.
pub(crate) async fn exchange_credentials(
    http: &reqwest::Client,
    server_url: &str,
    username: &str,
    password: &str,
    timeout: Option<Duration>,
) -> Result<AuthTokens> {
    let url = format!("{}{}", server_url, AUTHENTICATE_PATH);
    log::debug!("[AUTH] Authenticating '{}' at {}", username, url);

    let request = http
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, basic_credentials(username, password));
    let response = with_timeout(request, timeout).send().await?;

    read_tokens(response).await
}

/// Exchange a still-valid access token for a fresh token pair.
pub(crate) async fn exchange_refresh(
    http: &reqwest::Client,
    server_url: &str,
    access_token: &str,
    timeout: Option<Duration>,
) -> Result<AuthTokens> {
    let url = format!("{}{}", server_url, REFRESH_PATH);
    log::debug!("[AUTH] Refreshing access token at {}", url);

    let request = http.post(&url).bearer_auth(access_token);
    let response = with_timeout(request, timeout).send().await?;

    read_tokens(response).await
}

fn with_timeout(request: reqwest::RequestBuilder, timeout: Option<Duration>) -> reqwest::RequestBuilder {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}

async fn read_tokens(response: reqwest::Response) -> Result<AuthTokens> {
    let status = response.status().as_u16();
    let body = response.bytes().await?;

    // 401/403 classify as AuthenticationError; other failures keep their
    // usual classification.
    if status >= 400 {
        log::warn!("[AUTH] Token exchange failed (HTTP {})", status);
        let errors = ErrorDetail::parse_body(status, &body);
        return Err(VantiqResponse::failure(status, None, errors).into_error());
    }

    let tokens: AuthTokens = serde_json::from_slice(&body).map_err(|e| {
        VantiqError::AuthenticationError(format!("Malformed authentication response: {}", e))
    })?;
    Ok(tokens)
}
