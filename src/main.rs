use anyhow::Result;
use reqwest::Url;
use solarizer::breaker::CircuitBreaker;
use solarizer::config::Config;
use solarizer::logging::init_logging;
use solarizer::scheduler::Scheduler;
use solarizer::session::{CookieScope, SessionStore};
use solarizer::sink::{InfluxSink, LogSink, Sink};
use solarizer::solarweb::{SnapshotSource, SolarWebClient};
use solarizer::web::{self, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    init_logging(&config.logging)?;

    info!("Solarizer {} starting up", env!("APP_VERSION"));

    // Session store; an unreadable session file is fatal
    let base_url = Url::parse(&config.solarweb.base_url)?;
    let scope = CookieScope::for_base_url(&base_url, &config.solarweb.cookie_name)?;
    let session = Arc::new(SessionStore::open(&config.solarweb.auth_cookie_file, scope)?);
    if let Some(cookie) = config.solarweb.auth_cookie.as_deref()
        && let Err(e) = session.apply(cookie)
    {
        warn!("Auth cookie from environment not persisted: {}", e);
    }

    let breaker = Arc::new(CircuitBreaker::new(&config.breaker));
    let client: Arc<dyn SnapshotSource> = Arc::new(SolarWebClient::from_config(
        &config.solarweb,
        session.clone(),
        breaker.clone(),
    )?);

    let sink: Arc<dyn Sink> = if config.influx.is_enabled() {
        Arc::new(InfluxSink::new(&config.influx)?)
    } else {
        warn!("No InfluxDB url configured; points are only logged");
        Arc::new(LogSink::new())
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(client.clone(), sink, &config.schedule);
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let state = AppState::new(client, session, breaker, config.web.api_tokens.clone());
    let mut web_shutdown = shutdown_tx.subscribe();
    let host = config.web.host.clone();
    let port = config.web.port;
    let mut web_task = tokio::spawn(async move {
        web::serve(state, &host, port, async move {
            let _ = web_shutdown.wait_for(|stop| *stop).await;
        })
        .await
    });

    let web_finished = tokio::select! {
        signal = wait_for_signal() => {
            info!("Shutting down ({})", signal);
            false
        }
        res = &mut web_task => {
            match res {
                Ok(Ok(())) => warn!("API server exited"),
                Ok(Err(e)) => error!("API server failed: {}", e),
                Err(e) => error!("API server task panicked: {}", e),
            }
            true
        }
    };

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        error!("Import loop task failed: {}", e);
    }
    if !web_finished {
        match tokio::time::timeout(SHUTDOWN_GRACE, web_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("Shutdown of API server failed: {}", e),
            Ok(Err(e)) => error!("API server task panicked: {}", e),
            Err(_) => warn!("API server did not stop within {:?}", SHUTDOWN_GRACE),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}
