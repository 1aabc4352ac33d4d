//! Time-series output
//!
//! Records are shaped into [`Point`]s (see [`crate::publish`]) and handed to a
//! [`Sink`]. [`InfluxSink`] writes InfluxDB v2 line protocol over HTTP;
//! [`LogSink`] only logs the lines and is used when no database is configured.

use crate::config::InfluxConfig;
use crate::error::{Result, SolarizerError};
use crate::logging::get_logger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

/// One time-series sample
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: Vec<(String, f64)>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.tag(key, if value { "true" } else { "false" })
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = at;
        self
    }

    /// Encode as one line of InfluxDB line protocol with nanosecond precision.
    ///
    /// Empty tag values and non-finite fields are left out; `None` when no
    /// field survives since such a line would be rejected.
    pub fn to_line_protocol(&self) -> Option<String> {
        let fields: Vec<&(String, f64)> =
            self.fields.iter().filter(|(_, v)| v.is_finite()).collect();
        if fields.is_empty() {
            return None;
        }

        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }
        for (i, (key, value)) in fields.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            let _ = write!(line, "{}{}={}", sep, escape(key, &[',', '=', ' ']), value);
        }
        if let Some(nanos) = self.timestamp.timestamp_nanos_opt() {
            let _ = write!(line, " {}", nanos);
        }
        Some(line)
    }
}

// Line breaks cannot be escaped in line protocol; they become spaces
fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c == '\n' || c == '\r' { ' ' } else { c };
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Encode a batch; points without fields are dropped
pub fn encode_batch(points: &[Point]) -> String {
    points
        .iter()
        .filter_map(Point::to_line_protocol)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Destination for published points
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&self, points: &[Point]) -> Result<()>;
}

/// InfluxDB v2 HTTP writer
pub struct InfluxSink {
    http: reqwest::Client,
    write_url: Url,
    token: String,
    logger: crate::logging::StructuredLogger,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let base = Url::parse(&config.url).map_err(|e| {
            SolarizerError::validation("influx.url", format!("Invalid URL: {}", e))
        })?;
        let mut write_url = base
            .join("/api/v2/write")
            .map_err(|e| SolarizerError::config(format!("Invalid influx url: {}", e)))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &config.org)
            .append_pair("bucket", &config.bucket)
            .append_pair("precision", "ns");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let logger = get_logger("influx");
        logger.info(&format!(
            "InfluxDB sink initialized (url={}, org={}, bucket={})",
            config.url, config.org, config.bucket
        ));
        Ok(Self {
            http,
            write_url,
            token: config.token.clone(),
            logger,
        })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }
}

#[async_trait]
impl Sink for InfluxSink {
    async fn write(&self, points: &[Point]) -> Result<()> {
        let body = encode_batch(points);
        if body.is_empty() {
            return Ok(());
        }
        for line in body.lines() {
            self.logger.debug(&format!("point {}", line));
        }

        let resp = self
            .http
            .post(self.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| SolarizerError::sink(format!("InfluxDB write failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SolarizerError::sink(format!(
                "InfluxDB write rejected with {}: {}",
                status,
                text.trim()
            )));
        }
        Ok(())
    }
}

/// Sink that only logs line protocol
pub struct LogSink {
    logger: crate::logging::StructuredLogger,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            logger: get_logger("sink"),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for LogSink {
    async fn write(&self, points: &[Point]) -> Result<()> {
        for line in points.iter().filter_map(Point::to_line_protocol) {
            self.logger.debug(&format!("point {}", line));
        }
        Ok(())
    }
}
