use crate::broker::{BrokerClient, DashboardEvent};
use crate::charts::ChartBackend;
use crate::config::Config;
use crate::config_loader::{load_config, ConfigError};
use crate::connection_manager::ConnectionManager;
use crate::models::BrokerConfig;
use crate::rest_server::run_rest_server;
use rocket::{Build, Rocket};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{error, info, warn};

/// Start the REST server
pub fn start_rest_server(rocket: Rocket<Build>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_rest_server(rocket).await {
            error!("REST server failed: {:?}", e);
        }
    })
}

/// Fetch the broker settings, asking again while the endpoint is unreachable.
/// Errors reported by the endpoint itself end the attempts immediately.
pub async fn fetch_config_with_retry(
    http: &reqwest::Client,
    config: &Config,
) -> Result<BrokerConfig, ConfigError> {
    let url = config.config_url.as_str();
    let strategy = FixedInterval::new(Duration::from_millis(config.config_retry_interval_ms))
        .take(config.config_fetch_attempts.saturating_sub(1));

    RetryIf::spawn(
        strategy,
        || async move {
            let result = load_config(http, url).await;
            if let Err(e) = &result {
                if e.is_transient() {
                    warn!("Config fetch failed: {}", e);
                }
            }
            result
        },
        ConfigError::is_transient,
    )
    .await
}

/// Start the connection manager on its own task
pub fn start_connection_manager<C, B>(
    manager: ConnectionManager<C, B>,
    events: mpsc::UnboundedReceiver<DashboardEvent>,
) -> JoinHandle<()>
where
    C: BrokerClient + Send + 'static,
    C::Handle: Send,
    B: ChartBackend + Send + 'static,
{
    tokio::spawn(async move {
        manager.run(events).await;
        info!("Connection manager stopped.");
    })
}

/// Wait for Ctrl-C, then tell the connection manager to shut down
pub async fn handle_shutdown(events: mpsc::UnboundedSender<DashboardEvent>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to handle termination signal: {:?}", e);
    } else {
        info!("Dashboard is shutting down...");
    }

    if events.send(DashboardEvent::Shutdown).is_err() {
        warn!("Connection manager already stopped.");
    }
}
