//! Solar.web session credential management
//!
//! The dashboard authenticates with a single session cookie and may rotate
//! it on any response (sliding sessions). [`SessionStore`] owns that value,
//! hands it to the transport for every request and writes every change to a
//! small file so the session survives restarts.
//!
//! Operator-supplied values go through [`SessionStore::apply`] and
//! remote-issued ones through [`SessionStore::observe`]. Both take the same
//! lock and persist while holding it, so the file never lags behind the live
//! value and concurrent writers resolve in call order.

use crate::error::{Result, SolarizerError};
use crate::logging::{LogContext, get_logger, get_logger_with_context};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Which requests the session cookie belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieScope {
    /// Cookie name
    pub name: String,
    /// Exact host the cookie is sent to and accepted from
    pub host: String,
    /// Path prefix, always `/` for the dashboard
    pub path: String,
    /// Only attach over https
    pub secure: bool,
}

impl CookieScope {
    /// Scope covering the whole site behind `base_url`
    pub fn for_base_url(base_url: &Url, name: &str) -> Result<Self> {
        let host = base_url.host_str().ok_or_else(|| {
            SolarizerError::validation("solarweb.base_url", "URL has no host")
        })?;
        Ok(Self {
            name: name.to_string(),
            host: host.to_ascii_lowercase(),
            path: "/".to_string(),
            secure: base_url.scheme() == "https",
        })
    }

    fn host_matches(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.host))
    }

    fn matches(&self, url: &Url) -> bool {
        self.host_matches(url)
            && url.path().starts_with(&self.path)
            && (!self.secure || url.scheme() == "https")
    }
}

/// The active session token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub value: String,
    /// Expiry advertised by the remote, if any
    pub expires: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// A cookie carried by a `Set-Cookie` response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub expires: Option<DateTime<Utc>>,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires: None,
        }
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    // Max-Age=0 or an expiry in the past is the server clearing the cookie
    fn is_removal(&self) -> bool {
        self.expires.is_some_and(|e| e <= Utc::now())
    }
}

impl From<reqwest::cookie::Cookie<'_>> for ResponseCookie {
    fn from(cookie: reqwest::cookie::Cookie<'_>) -> Self {
        let expires = match cookie.max_age() {
            Some(max_age) => chrono::Duration::from_std(max_age)
                .ok()
                .map(|d| Utc::now() + d),
            None => cookie.expires().map(DateTime::<Utc>::from),
        };
        Self {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            expires,
        }
    }
}

/// Redacted view of the session for status output
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub present: bool,
    pub length: usize,
    pub prefix: String,
    pub expires: Option<DateTime<Utc>>,
    pub file: String,
}

#[derive(Debug, Default)]
struct SessionState {
    current: Credential,
    /// Last value written to the file, used to detect rotations
    last_seen: String,
}

/// Persistent holder of the Solar.web session cookie
#[derive(Debug)]
pub struct SessionStore {
    file_path: PathBuf,
    scope: CookieScope,
    state: Mutex<SessionState>,
    logger: crate::logging::StructuredLogger,
}

impl SessionStore {
    /// Open the store, creating the session file's directory and loading any saved value
    pub fn open(file_path: impl Into<PathBuf>, scope: CookieScope) -> Result<Self> {
        let file_path = file_path.into();
        let logger = get_logger_with_context(
            LogContext::new("session").with_field("file", file_path.display()),
        );

        if let Some(dir) = file_path.parent()
            && !dir.as_os_str().is_empty()
        {
            create_private_dir(dir).map_err(|e| {
                logger.error(&format!(
                    "Unable to create session directory {}: {}",
                    dir.display(),
                    e
                ));
                SolarizerError::io(format!("{}: {}", dir.display(), e))
            })?;
        }

        let current = Self::load(&file_path)?;
        if !current.is_empty() {
            logger.info(&format!(
                "Loaded session cookie from {} (len={}, value={}...)",
                file_path.display(),
                current.value.len(),
                head(&current.value)
            ));
        }

        Ok(Self {
            file_path,
            scope,
            state: Mutex::new(SessionState {
                last_seen: current.value.clone(),
                current,
            }),
            logger,
        })
    }

    /// Read the durable copy; a missing file yields an empty credential
    pub fn load(path: &Path) -> Result<Credential> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    SolarizerError::io(format!("{}: session file is not UTF-8", path.display()))
                })?;
                Ok(Credential::new(text.trim_end_matches(['\r', '\n'])))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                get_logger("session").warn(&format!(
                    "Session file {} does not exist",
                    path.display()
                ));
                Ok(Credential::default())
            }
            Err(e) => Err(SolarizerError::io(format!("{}: {}", path.display(), e))),
        }
    }

    /// Install `value` as the active credential and overwrite the durable copy.
    ///
    /// The in-memory value is replaced even when the write fails; the returned
    /// error only reports degraded persistence.
    pub fn apply(&self, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.current = Credential::new(value);
        state.last_seen = value.to_string();
        self.logger.info(&format!(
            "Session cookie set (len={}, value={}...)",
            value.len(),
            head(value)
        ));
        self.persist(value)
    }

    /// Reconcile cookies from a response; returns true when the credential rotated
    pub fn observe(&self, url: &Url, cookies: &[ResponseCookie]) -> bool {
        if !self.scope.host_matches(url) {
            return false;
        }
        let Some(cookie) = cookies.iter().find(|c| c.name == self.scope.name) else {
            return false;
        };

        let value = if cookie.is_removal() {
            ""
        } else {
            cookie.value.as_str()
        };

        let mut state = self.lock();
        if state.last_seen == value {
            if cookie.expires.is_some() {
                state.current.expires = cookie.expires;
            }
            return false;
        }

        if value.is_empty() {
            self.logger
                .warn("Remote cleared the session cookie; session needs to be re-seeded");
        } else {
            self.logger.info(&format!(
                "Session cookie was updated (exp={}, len={}, value={}...)",
                cookie
                    .expires
                    .map(|e| e.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                value.len(),
                head(value)
            ));
        }
        state.current = Credential {
            value: value.to_string(),
            expires: cookie.expires,
        };
        state.last_seen = value.to_string();
        if let Err(e) = self.persist(value) {
            self.logger
                .debug(&format!("Rotated cookie kept in memory only: {}", e));
        }
        true
    }

    /// Copy of the active credential
    pub fn current(&self) -> Credential {
        self.lock().current.clone()
    }

    /// `Cookie` header value for a request to `url`, if the scope allows it
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        if !self.scope.matches(url) {
            return None;
        }
        let state = self.lock();
        if state.current.is_empty() {
            return None;
        }
        Some(format!("{}={}", self.scope.name, state.current.value))
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.lock();
        SessionSummary {
            present: !state.current.is_empty(),
            length: state.current.value.len(),
            prefix: head(&state.current.value).to_string(),
            expires: state.current.expires,
            file: self.file_path.display().to_string(),
        }
    }

    pub fn scope(&self) -> &CookieScope {
        &self.scope
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Called with the state lock held
    fn persist(&self, value: &str) -> Result<()> {
        write_private(&self.file_path, value.as_bytes()).map_err(|e| {
            self.logger.error(&format!(
                "Unable to save session file {}: {}",
                self.file_path.display(),
                e
            ));
            SolarizerError::session_persistence(format!("{}: {}", self.file_path.display(), e))
        })
    }
}

fn head(s: &str) -> &str {
    match s.char_indices().nth(10) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> CookieScope {
        CookieScope::for_base_url(
            &Url::parse("https://www.solarweb.com").unwrap(),
            ".AspNet.Auth",
        )
        .unwrap()
    }

    #[test]
    fn head_is_char_safe() {
        assert_eq!(head("abc"), "abc");
        assert_eq!(head("0123456789abcdef"), "0123456789");
        assert_eq!(head("ääääääääääää"), "ääääääääää");
    }

    #[test]
    fn scope_matching_rules() {
        let scope = scope();
        assert!(scope.secure);
        assert!(scope.matches(&Url::parse("https://www.solarweb.com/Chart/GetWidgetChart").unwrap()));
        assert!(scope.matches(&Url::parse("https://WWW.SOLARWEB.COM/").unwrap()));
        assert!(!scope.matches(&Url::parse("http://www.solarweb.com/").unwrap()));
        assert!(!scope.matches(&Url::parse("https://evil.example.com/").unwrap()));
    }

    #[test]
    fn removal_cookie_detection() {
        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(ResponseCookie::new("a", "").with_expires(past).is_removal());
        assert!(!ResponseCookie::new("a", "v").is_removal());
    }
}
