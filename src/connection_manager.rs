use crate::broker::{BrokerClient, BrokerEvent, BrokerHandle, ConnectOptions, DashboardEvent, EventSink};
use crate::charts::{ChartBackend, ChartRenderer};
use crate::models::{BrokerConfig, ConnectionState, Reading, StatusStyle};
use crate::series::SeriesBuffer;
use crate::status::StatusReporter;
use crate::temperature::parse_temperature;
use log::{debug, info, warn};
use std::ops::ControlFlow;
use tokio::sync::mpsc;

/// Owns the single broker connection and all dashboard state. Every event is
/// handled by `dispatch`, one at a time, in arrival order.
pub struct ConnectionManager<C: BrokerClient, B: ChartBackend> {
    config: BrokerConfig,
    options: ConnectOptions,
    client: C,
    handle: Option<C::Handle>,
    generation: u64,
    state: ConnectionState,
    series: SeriesBuffer,
    charts: ChartRenderer<B>,
    reporter: StatusReporter,
    events: mpsc::UnboundedSender<DashboardEvent>,
}

impl<C: BrokerClient, B: ChartBackend> ConnectionManager<C, B> {
    pub fn new(
        config: BrokerConfig,
        options: ConnectOptions,
        client: C,
        charts: ChartRenderer<B>,
        reporter: StatusReporter,
        events: mpsc::UnboundedSender<DashboardEvent>,
    ) -> Self {
        reporter.set_topic(&config.topic);
        Self {
            config,
            options,
            client,
            handle: None,
            generation: 0,
            state: ConnectionState::Idle,
            series: SeriesBuffer::new(),
            charts,
            reporter,
            events,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn series(&self) -> &SeriesBuffer {
        &self.series
    }

    #[cfg(test)]
    pub fn charts(&self) -> &ChartRenderer<B> {
        &self.charts
    }

    #[cfg(test)]
    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// Draws the empty widgets and opens the first connection.
    pub fn start(&mut self) {
        self.charts.init();
        self.connect();
    }

    /// Replaces any existing connection with a fresh one.
    pub fn connect(&mut self) {
        self.teardown();
        self.generation += 1;

        self.transition(ConnectionState::Connecting, None);
        self.reporter
            .log(format!("Connecting to broker: {}", self.config.broker_url));

        let sink = EventSink::new(self.generation, self.events.clone());
        match self.client.connect(&self.config.broker_url, &self.options, sink) {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                let message = e.to_string();
                self.transition(ConnectionState::Error, Some(&message));
                self.reporter.log(format!("MQTT error: {}", message));
            }
        }
    }

    /// Closes the current connection, if any. Failures are only logged.
    pub fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.end() {
                warn!("Previous MQTT client could not be closed: {}", e);
            }
        }
    }

    pub fn dispatch(&mut self, event: DashboardEvent) -> ControlFlow<()> {
        match event {
            DashboardEvent::ManualReconnectRequested => {
                self.reporter.log("Manual reconnect requested");
                self.connect();
            }
            DashboardEvent::Shutdown => {
                info!("Shutting down connection manager...");
                self.teardown();
                return ControlFlow::Break(());
            }
            DashboardEvent::Broker { generation, event } if generation != self.generation => {
                debug!(
                    "Dropping {:?} from superseded connection {} (current {}).",
                    event, generation, self.generation
                );
            }
            DashboardEvent::Broker { event, .. } => self.on_broker_event(event),
        }
        ControlFlow::Continue(())
    }

    /// Drains events until shutdown or until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<DashboardEvent>) {
        self.start();
        while let Some(event) = events.recv().await {
            if self.dispatch(event).is_break() {
                break;
            }
        }
        self.teardown();
    }

    fn on_broker_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => {
                self.transition(ConnectionState::Connected, None);
                self.reporter.log(format!(
                    "Connected to broker, subscribing to topic: {}",
                    self.config.topic
                ));

                let result = match self.handle.as_mut() {
                    Some(handle) => handle.subscribe(&self.config.topic),
                    None => return,
                };
                if let Err(e) = result {
                    self.on_subscribe_failed(&e.to_string());
                }
            }
            BrokerEvent::Subscribed => {
                self.reporter
                    .log(format!("Subscribed to {}", self.config.topic));
            }
            BrokerEvent::SubscribeFailed(reason) => self.on_subscribe_failed(&reason),
            BrokerEvent::MessageReceived { topic, payload } => self.on_message(&topic, &payload),
            BrokerEvent::TransportError(message) => {
                self.transition(ConnectionState::Error, Some(&message));
                self.reporter.log(format!("MQTT error: {}", message));
            }
            BrokerEvent::Reconnecting => {
                self.transition(ConnectionState::Reconnecting, None);
                self.reporter.log("Reconnect attempt...");
            }
            BrokerEvent::Closed => {
                self.transition(ConnectionState::Closed, None);
                self.reporter.log("Connection closed");
            }
        }
    }

    // The transport stays open; only the status reflects the failure.
    fn on_subscribe_failed(&mut self, reason: &str) {
        self.state = ConnectionState::Error;
        self.reporter.set_status("Subscribe failed", StatusStyle::Error);
        self.reporter.log(format!("Subscribe failed: {}", reason));
    }

    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        let payload = String::from_utf8_lossy(payload);
        self.reporter.log_message(topic, &payload);

        match parse_temperature(&payload) {
            Some(value) => {
                self.series.push(Reading::now(value));
                self.charts.update(&self.series);
            }
            None => debug!("No temperature in payload on '{}'.", topic),
        }
    }

    fn transition(&mut self, state: ConnectionState, detail: Option<&str>) {
        debug!("Connection state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.reporter.show_state(state, detail);
    }
}
