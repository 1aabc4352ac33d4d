//! Axum-based HTTP facade
//!
//! Proxies the three Solar.web snapshots, accepts a fresh session cookie and
//! reports breaker and session health. Everything except `/api/health` needs
//! an `Authorization: Bearer <token>` header naming one of the configured
//! API tokens.

use crate::breaker::CircuitBreaker;
use crate::error::SolarizerError;
use crate::logging::get_logger;
use crate::session::SessionStore;
use crate::solarweb::SnapshotSource;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Serialize;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn SnapshotSource>,
    pub session: Arc<SessionStore>,
    pub breaker: Arc<CircuitBreaker>,
    pub tokens: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        session: Arc<SessionStore>,
        breaker: Arc<CircuitBreaker>,
        tokens: Vec<String>,
    ) -> Self {
        Self {
            source,
            session,
            breaker,
            tokens: Arc::new(tokens.into_iter().filter(|t| !t.is_empty()).collect()),
        }
    }

    // Every token is compared; no early exit on a match
    fn is_known_token(&self, candidate: &str) -> bool {
        self.tokens.iter().fold(false, |found, token| {
            let eq: bool = token.as_bytes().ct_eq(candidate.as_bytes()).into();
            found | eq
        })
    }
}

/// Plain-text error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<SolarizerError> for ApiError {
    fn from(err: SolarizerError) -> Self {
        let status = match &err {
            SolarizerError::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SolarizerError::Transport { .. }
            | SolarizerError::RemoteStatus { .. }
            | SolarizerError::Decode { .. } => StatusCode::BAD_GATEWAY,
            SolarizerError::Auth { .. } => StatusCode::UNAUTHORIZED,
            SolarizerError::Validation { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

async fn require_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|value| {
            let trimmed = value.trim_start();
            if trimmed.len() >= 7 && trimmed[..7].eq_ignore_ascii_case("bearer ") {
                Some(trimmed[7..].trim())
            } else {
                None
            }
        });

    let logger = get_logger("web");
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        logger.warn("Rejected request: empty or invalid authorization header");
        return Err(ApiError::unauthorized("empty or invalid authorization header"));
    };
    if !state.is_known_token(token) {
        logger.warn("Rejected request: unknown API key");
        return Err(ApiError::forbidden("unknown API key"));
    }
    Ok(next.run(req).await)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": env!("APP_VERSION"),
        "breaker": {
            "state": state.breaker.state(),
            "counts": state.breaker.counts(),
        },
        "session": state.session.summary(),
    }))
}

async fn put_auth_cookie(State(state): State<AppState>, body: String) -> Response {
    let value = body.trim();
    if value.is_empty() {
        return ApiError::new(StatusCode::BAD_REQUEST, "empty cookie value").into_response();
    }
    if HeaderValue::from_str(value).is_err() {
        get_logger("web").warn("Rejected auth cookie update: value is not a valid header value");
        return ApiError::new(StatusCode::BAD_REQUEST, "cookie value contains invalid characters")
            .into_response();
    }
    get_logger("web").debug("Received auth cookie update");
    if let Err(e) = state.session.apply(value) {
        // The live credential is already replaced; only durability is degraded
        get_logger("web").warn(&format!("Auth cookie accepted but not persisted: {}", e));
    }
    StatusCode::ACCEPTED.into_response()
}

async fn proxy<T, F, Fut>(what: &str, fetch: F) -> Result<Json<T>, ApiError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = crate::error::Result<T>>,
{
    match fetch().await {
        Ok(data) => Ok(Json(data)),
        Err(e) => {
            let logger = get_logger("web");
            if e.is_breaker_open() {
                logger.warn(&format!("Refused {} request: {}", what, e));
            } else {
                logger.error(&format!("Error requesting {} data: {}", what, e));
            }
            Err(e.into())
        }
    }
}

async fn get_power(State(state): State<AppState>) -> impl IntoResponse {
    proxy("power", || state.source.power()).await
}

async fn get_production(State(state): State<AppState>) -> impl IntoResponse {
    proxy("earnings", || state.source.earnings_and_savings()).await
}

async fn get_balance(State(state): State<AppState>) -> impl IntoResponse {
    proxy("balance", || state.source.balance()).await
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/cookie", put(put_auth_cookie))
        .route("/api/pv/power", get(get_power))
        .route("/api/pv/production", get(get_production))
        .route("/api/pv/balance", get(get_balance))
        .route("/api/status", get(status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/api/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the facade until `shutdown` resolves
pub async fn serve<S>(state: AppState, host: &str, port: u16, shutdown: S) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);
    let logger = get_logger("web");

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 0.0.0.0", host));
            SocketAddr::from(([0, 0, 0, 0], port))
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "API server listening at http://{}:{}",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    logger.info("API server stopped");
    Ok(())
}
