use super::types::{EarningsAndSavings, GridBalance, PowerSnapshot};
use crate::breaker::CircuitBreaker;
use crate::config::SolarWebConfig;
use crate::error::{Result, SolarizerError};
use crate::fetcher::{HttpTransport, ResilientFetcher, Transport};
use crate::logging::get_logger;
use crate::session::SessionStore;
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

pub const POWER_PATH: &str = "/ActualData/GetCompareDataForPvSystem";
pub const EARNINGS_PATH: &str = "/PvSystems/GetPvSystemEarningsAndSavings";
pub const BALANCE_PATH: &str = "/Chart/GetWidgetChart";

/// Anything that can produce the three Solar.web snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn power(&self) -> Result<PowerSnapshot>;
    async fn earnings_and_savings(&self) -> Result<EarningsAndSavings>;
    async fn balance(&self) -> Result<GridBalance>;
}

/// Typed Solar.web client for one PV system
pub struct SolarWebClient {
    pv_system_id: String,
    fetcher: ResilientFetcher,
    session: Option<Arc<SessionStore>>,
}

impl SolarWebClient {
    pub fn new(pv_system_id: impl Into<String>, fetcher: ResilientFetcher) -> Self {
        Self {
            pv_system_id: pv_system_id.into(),
            fetcher,
            session: None,
        }
    }

    /// Wire up the production transport from configuration
    pub fn from_config(
        config: &SolarWebConfig,
        session: Arc<SessionStore>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SolarizerError::validation("solarweb.base_url", format!("Invalid URL: {}", e))
        })?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            session.clone(),
            Duration::from_secs(config.timeout_secs),
        )?);
        let fetcher = ResilientFetcher::new(base_url, &config.user_agent, transport, breaker)?;
        get_logger("solarweb").info(&format!(
            "Solar.web client initialized for PV system {}",
            config.pv_system_id
        ));
        Ok(Self {
            pv_system_id: config.pv_system_id.clone(),
            fetcher,
            session: Some(session),
        })
    }

    /// Seed the session with an operator-supplied cookie value
    pub fn set_auth_cookie(&self, value: &str) -> Result<()> {
        match &self.session {
            Some(session) => session.apply(value),
            None => Err(SolarizerError::config("Client has no session store attached")),
        }
    }

    pub fn pv_system_id(&self) -> &str {
        &self.pv_system_id
    }

    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, id_param: &str) -> Result<T> {
        let body = self
            .fetcher
            .fetch_json(path, &[(id_param, self.pv_system_id.as_str())])
            .await?;
        serde_json::from_slice(&body)
            .map_err(|e| SolarizerError::decode(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl SnapshotSource for SolarWebClient {
    async fn power(&self) -> Result<PowerSnapshot> {
        self.get(POWER_PATH, "pvSystemId").await
    }

    async fn earnings_and_savings(&self) -> Result<EarningsAndSavings> {
        self.get(EARNINGS_PATH, "pvSystemId").await
    }

    // This endpoint spells the parameter with a capital P
    async fn balance(&self) -> Result<GridBalance> {
        self.get(BALANCE_PATH, "PvSystemId").await
    }
}
