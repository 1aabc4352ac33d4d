//! Shared fakes for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::HeaderMap;
use solarizer::breaker::CircuitBreaker;
use solarizer::config::BreakerConfig;
use solarizer::error::{Result, SolarizerError};
use solarizer::fetcher::{ResilientFetcher, Transport, TransportResponse};
use solarizer::session::CookieScope;
use solarizer::sink::{Point, Sink};
use solarizer::solarweb::{EarningsAndSavings, GridBalance, PowerSnapshot, SnapshotSource};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Barrier;

pub const BASE_URL: &str = "https://www.solarweb.com";
pub const COOKIE_NAME: &str = ".AspNet.Auth";

pub fn scope() -> CookieScope {
    CookieScope::for_base_url(&Url::parse(BASE_URL).unwrap(), COOKIE_NAME).unwrap()
}

pub fn breaker() -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(&BreakerConfig::default()))
}

/// One scripted transport reply
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, &'static str),
    Error(&'static str),
}

/// Transport replaying scripted replies and recording every request
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Mutex<Option<Reply>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<(Url, HeaderMap)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Reply used once the script is exhausted
    pub fn set_fallback(&self, reply: Reply) {
        *self.fallback.lock().unwrap() = Some(reply);
    }

    /// Hold every reply back for `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<(Url, HeaderMap)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<TransportResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((url.clone(), headers.clone()));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone())
            .unwrap_or(Reply::Status(200, "{}"));
        match reply {
            Reply::Status(status, body) => Ok(TransportResponse {
                status,
                body: body.as_bytes().to_vec(),
            }),
            Reply::Error(message) => Err(SolarizerError::transport(message)),
        }
    }
}

pub fn fetcher(transport: Arc<MockTransport>, breaker: Arc<CircuitBreaker>) -> ResilientFetcher {
    ResilientFetcher::new(
        Url::parse(BASE_URL).unwrap(),
        "Mozilla/5.0 (test)",
        transport,
        breaker,
    )
    .unwrap()
}

/// Snapshot source with call counters; optionally every call waits on a barrier
#[derive(Default)]
pub struct FakeSource {
    pub power_calls: AtomicUsize,
    pub earnings_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,
    pub barrier: Option<Arc<Barrier>>,
    pub fail_breaker_open: bool,
}

impl FakeSource {
    pub fn with_barrier(barrier: Arc<Barrier>) -> Self {
        Self {
            barrier: Some(barrier),
            ..Self::default()
        }
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.power_calls.load(Ordering::SeqCst),
            self.earnings_calls.load(Ordering::SeqCst),
            self.balance_calls.load(Ordering::SeqCst),
        )
    }

    async fn enter(&self, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.fail_breaker_open {
            return Err(SolarizerError::breaker_open("open"));
        }
        Ok(())
    }
}

pub fn sample_power() -> PowerSnapshot {
    PowerSnapshot {
        is_online: true,
        all_online: true,
        power_pv: 2300.0,
        power_grid: -150.0,
        power_load: 850.0,
        power_battery: -1300.0,
        battery_percentage: 64.0,
        battery_mode: 1.0,
    }
}

pub fn sample_balance() -> GridBalance {
    GridBalance {
        has_meter: true,
        to_grid: 12.4,
        from_grid: 0.3,
        ..GridBalance::default()
    }
}

#[async_trait]
impl SnapshotSource for FakeSource {
    async fn power(&self) -> Result<PowerSnapshot> {
        self.enter(&self.power_calls).await?;
        Ok(sample_power())
    }

    async fn earnings_and_savings(&self) -> Result<EarningsAndSavings> {
        self.enter(&self.earnings_calls).await?;
        Ok(EarningsAndSavings::default())
    }

    async fn balance(&self) -> Result<GridBalance> {
        self.enter(&self.balance_calls).await?;
        Ok(sample_balance())
    }
}

/// Sink keeping every point in memory
#[derive(Default)]
pub struct MemorySink {
    points: Mutex<Vec<Point>>,
}

impl MemorySink {
    pub fn points(&self) -> Vec<Point> {
        self.points.lock().unwrap().clone()
    }

    pub fn measurements(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .points
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.measurement.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, points: &[Point]) -> Result<()> {
        self.points.lock().unwrap().extend_from_slice(points);
        Ok(())
    }
}
