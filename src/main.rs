mod broker;
mod charts;
mod config;
mod config_loader;
mod connection_manager;
mod env_file;
mod models;
mod mqtt_service;
mod rest_server;
mod series;
mod service_utils;
mod status;
mod temperature;

use crate::broker::ConnectOptions;
use crate::charts::{ChartRenderer, FrameSink};
use crate::config::Config;
use crate::connection_manager::ConnectionManager;
use crate::models::StatusStyle;
use crate::mqtt_service::MqttService;
use crate::rest_server::{build_rocket, ServerState};
use crate::service_utils::{
    fetch_config_with_retry, handle_shutdown, start_connection_manager, start_rest_server,
};
use crate::status::StatusReporter;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {:?}", e);
            return;
        }
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let reporter = StatusReporter::new();
    let charts = ChartRenderer::new(FrameSink::new());

    // Start REST API server
    let state = ServerState {
        env_file_path: config.env_file_path.clone(),
        events: events_tx.clone(),
        status: reporter.subscribe(),
        charts: charts.backend().subscribe(),
    };
    let rest_api_task = start_rest_server(build_rocket(state, config.http_address, config.http_port));

    reporter.set_status("Fetching config...", StatusStyle::Default);
    let http = reqwest::Client::new();
    let broker_config = match fetch_config_with_retry(&http, &config).await {
        Ok(broker_config) => broker_config,
        Err(e) => {
            error!("Config error: {}", e);
            reporter.set_status(format!("Config error: {}", e), StatusStyle::Error);
            reporter.log(format!("Config error: {}", e));

            // Nothing will handle reconnect requests; let the REST API say so.
            drop(events_rx);

            // Keep serving the status until the operator stops us.
            let _ = tokio::join!(rest_api_task);
            return;
        }
    };
    info!(
        "Broker config loaded: {} (topic '{}')",
        broker_config.broker_url, broker_config.topic
    );
    reporter.set_status("Config loaded, initialising charts...", StatusStyle::Default);

    let options = ConnectOptions::new(&broker_config, config.reconnect_period(), config.keep_alive());
    let manager = ConnectionManager::new(
        broker_config,
        options,
        MqttService::new(),
        charts,
        reporter,
        events_tx.clone(),
    );
    let manager_task = start_connection_manager(manager, events_rx);

    handle_shutdown(events_tx).await;

    // Wait for tasks to complete
    let _ = tokio::join!(manager_task, rest_api_task);
    info!("All services shut down successfully.");
}
