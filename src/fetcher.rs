//! Breaker-gated JSON fetching against the Solar.web host
//!
//! [`ResilientFetcher`] builds every request (fixed base URL, JSON accept
//! header, browser user agent) and runs it through the shared
//! [`CircuitBreaker`]. The [`Transport`] underneath performs the HTTP call and
//! is where the session cookie is attached and rotations are observed.

use crate::breaker::CircuitBreaker;
use crate::error::{Result, SolarizerError};
use crate::logging::get_logger;
use crate::session::{ResponseCookie, SessionStore};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{ACCEPT, COOKIE, HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;

/// Longest remote error body kept for diagnostics
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Raw response as seen by the breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes a prepared GET request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<TransportResponse>;
}

/// `reqwest` transport carrying the session cookie explicitly.
///
/// No cookie store and no redirect following: the credential comes from the
/// [`SessionStore`] and every `Set-Cookie` goes back to it, and a redirect to
/// the login page surfaces as a 3xx status instead of an HTML body.
pub struct HttpTransport {
    http: reqwest::Client,
    session: Arc<SessionStore>,
}

impl HttpTransport {
    pub fn new(session: Arc<SessionStore>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, session })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<TransportResponse> {
        let mut request = self.http.get(url.clone()).headers(headers.clone());
        if let Some(cookie) = self.session.cookie_header(url) {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let cookies: Vec<ResponseCookie> = response.cookies().map(ResponseCookie::from).collect();
        self.session.observe(response.url(), &cookies);

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

/// Single entry point for all Solar.web JSON calls
pub struct ResilientFetcher {
    base_url: Url,
    headers: HeaderMap,
    transport: Arc<dyn Transport>,
    breaker: Arc<CircuitBreaker>,
    logger: crate::logging::StructuredLogger,
}

impl ResilientFetcher {
    pub fn new(
        base_url: Url,
        user_agent: &str,
        transport: Arc<dyn Transport>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|_| {
                SolarizerError::validation("solarweb.user_agent", "Not a valid header value")
            })?,
        );
        Ok(Self {
            base_url,
            headers,
            transport,
            breaker,
            logger: get_logger("fetcher"),
        })
    }

    /// Absolute URL for `path` with `query` appended
    pub fn url_for(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| SolarizerError::config(format!("Invalid path {}: {}", path, e)))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fetch a JSON resource; non-2xx and transport errors count against the breaker
    pub async fn fetch_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>> {
        let url = self.url_for(path, query)?;
        let transport = &self.transport;
        let url_ref = &url;
        let headers = &self.headers;

        let result = self
            .breaker
            .call(move || async move {
                let response = transport.get(url_ref, headers).await?;
                if !response.is_success() {
                    let body: String = String::from_utf8_lossy(&response.body)
                        .chars()
                        .take(MAX_ERROR_BODY_CHARS)
                        .collect();
                    return Err(SolarizerError::remote_status(response.status, body));
                }
                Ok(response.body)
            })
            .await;

        match &result {
            Ok(body) => self
                .logger
                .trace(&format!("GET {} -> {} bytes", path, body.len())),
            Err(e) if e.is_breaker_open() => self
                .logger
                .debug(&format!("GET {} refused locally: {}", path, e)),
            Err(e) => self.logger.debug(&format!("GET {} failed: {}", path, e)),
        }
        result
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}
