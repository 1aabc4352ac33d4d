//! # Solarizer - Solar.web poller and InfluxDB importer
//!
//! Keeps a browser-style Solar.web session alive, polls the dashboard's JSON
//! endpoints on two cadences and republishes the data to InfluxDB and to a
//! small authenticated HTTP API.
//!
//! ## Architecture
//!
//! - `session`: session cookie ownership, rotation tracking and persistence
//! - `breaker`: failure-rate circuit breaker guarding the remote
//! - `fetcher`: breaker-gated JSON fetching and the HTTP transport
//! - `solarweb`: typed endpoint client and number normalization
//! - `scheduler`: fast and slow polling cycles
//! - `publish` / `sink`: shaping records into points and writing them
//! - `web`: HTTP facade
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing

pub mod breaker;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod publish;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod solarweb;
pub mod web;

// Re-export commonly used types
pub use breaker::{BreakerState, CircuitBreaker};
pub use config::Config;
pub use error::{Result, SolarizerError};
pub use session::SessionStore;
pub use solarweb::{SnapshotSource, SolarWebClient};
