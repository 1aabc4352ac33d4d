//! Solar.web dashboard endpoints
//!
//! Typed access to the three JSON endpoints behind the dashboard widgets,
//! plus the number normalization their display-formatted values need.

pub mod client;
pub mod numeric;
pub mod types;

pub use client::{BALANCE_PATH, EARNINGS_PATH, POWER_PATH, SnapshotSource, SolarWebClient};
pub use numeric::parse_localized_float;
pub use types::{
    Chart, ChartSeries, Co2Savings, Earnings, EarningsAndSavings, EarningsAndSavingsData,
    GridBalance, PowerSnapshot,
};
