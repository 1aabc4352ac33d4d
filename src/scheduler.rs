//! Dual-cadence polling
//!
//! Two timers drive the importer. The fast one (15 s by default) publishes
//! the power snapshot; the slow one (5 min) publishes earnings and grid
//! balance as two independent tasks. Every tick spawns its tasks and returns
//! at once: a slow remote never delays the next tick and ticks may overlap.
//! Cancelling the scheduler stops the timers but leaves tasks already in
//! flight running to completion.

use crate::config::ScheduleConfig;
use crate::error::Result;
use crate::logging::get_logger;
use crate::publish::{balance_point, earnings_points, power_point};
use crate::sink::Sink;
use crate::solarweb::SnapshotSource;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Fast,
    Slow,
}

/// A timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub at: DateTime<Utc>,
    pub cadence: Cadence,
}

impl Tick {
    pub fn now(cadence: Cadence) -> Self {
        Self {
            at: Utc::now(),
            cadence,
        }
    }
}

pub struct Scheduler {
    source: Arc<dyn SnapshotSource>,
    sink: Arc<dyn Sink>,
    fast_interval: Duration,
    slow_interval: Duration,
    logger: crate::logging::StructuredLogger,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn Sink>,
        config: &ScheduleConfig,
    ) -> Self {
        Self::with_intervals(
            source,
            sink,
            Duration::from_secs(config.fast_interval_secs),
            Duration::from_secs(config.slow_interval_secs),
        )
    }

    pub fn with_intervals(
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn Sink>,
        fast_interval: Duration,
        slow_interval: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            fast_interval,
            slow_interval,
            logger: get_logger("scheduler"),
        }
    }

    /// Run both timers until `shutdown` turns true or its sender is dropped.
    ///
    /// The first tick of each timer fires one full period after the call.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let start = Instant::now();
        let mut fast = interval_at(start + self.fast_interval, self.fast_interval);
        let mut slow = interval_at(start + self.slow_interval, self.slow_interval);
        fast.set_missed_tick_behavior(MissedTickBehavior::Delay);
        slow.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.logger.info(&format!(
            "Import loop started (fast={}s, slow={}s)",
            self.fast_interval.as_secs_f64(),
            self.slow_interval.as_secs_f64()
        ));

        loop {
            tokio::select! {
                _ = fast.tick() => {
                    self.dispatch(Tick::now(Cadence::Fast));
                }
                _ = slow.tick() => {
                    self.dispatch(Tick::now(Cadence::Slow));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.logger.info("Import loop stopped");
    }

    /// Spawn the tasks belonging to `tick` and return without awaiting them
    pub fn dispatch(&self, tick: Tick) -> Vec<JoinHandle<()>> {
        match tick.cadence {
            Cadence::Fast => {
                self.logger
                    .debug(&format!("Running fast import ({})", tick.at.to_rfc3339()));
                vec![self.spawn_task("power", import_power)]
            }
            Cadence::Slow => {
                self.logger
                    .debug(&format!("Running slow import ({})", tick.at.to_rfc3339()));
                vec![
                    self.spawn_task("earnings", import_earnings),
                    self.spawn_task("balance", import_balance),
                ]
            }
        }
    }

    fn spawn_task<F, Fut>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<dyn SnapshotSource>, Arc<dyn Sink>) -> Fut,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let logger = self.logger.with_field("task", name);
        let fut = task(self.source.clone(), self.sink.clone());
        tokio::spawn(async move {
            match fut.await {
                Ok(()) => {}
                Err(e) if e.is_breaker_open() => {
                    logger.warn(&format!("Skipped {} import: {}", name, e))
                }
                Err(e) => logger.error(&format!("Error importing {} data: {}", name, e)),
            }
        })
    }
}

pub async fn import_power(source: Arc<dyn SnapshotSource>, sink: Arc<dyn Sink>) -> Result<()> {
    let data = source.power().await?;
    sink.write(&[power_point(&data, Utc::now())]).await
}

pub async fn import_earnings(source: Arc<dyn SnapshotSource>, sink: Arc<dyn Sink>) -> Result<()> {
    let data = source.earnings_and_savings().await?;
    sink.write(&earnings_points(&data, Utc::now())).await
}

pub async fn import_balance(source: Arc<dyn SnapshotSource>, sink: Arc<dyn Sink>) -> Result<()> {
    let data = source.balance().await?;
    sink.write(&[balance_point(&data, Utc::now())]).await
}
