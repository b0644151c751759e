use crate::broker::{
    BrokerClient, BrokerEvent, BrokerHandle, ConnectOptions, EventSink, SubscribeError,
    TransportError,
};
use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
    Transport,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

/// How long a closing connection may keep polling to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Tcp => 1883,
            Scheme::Tls => 8883,
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BrokerEndpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl BrokerEndpoint {
    fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => Scheme::Tcp,
            "mqtts" | "ssl" => Scheme::Tls,
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            _ => return Err(invalid("unsupported scheme")),
        };

        let authority = rest.split(['/', '?']).next().unwrap_or_default();
        let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| invalid("port must be a valid number"))?,
            ),
            None => (authority, scheme.default_port()),
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }
}

fn mqtt_options(
    url: &str,
    client_id: &str,
    options: &ConnectOptions,
) -> Result<MqttOptions, TransportError> {
    let endpoint = BrokerEndpoint::parse(url)?;
    debug!("Configuring MQTT broker at {}:{}...", endpoint.host, endpoint.port);

    // Websocket transports take the full URL as the broker address.
    let mut mqtt_options = match endpoint.scheme {
        Scheme::Ws | Scheme::Wss => MqttOptions::new(client_id, url, endpoint.port),
        Scheme::Tcp | Scheme::Tls => MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port),
    };
    match endpoint.scheme {
        Scheme::Tcp => {}
        Scheme::Tls => {
            mqtt_options.set_transport(Transport::tls_with_default_config());
        }
        Scheme::Ws => {
            mqtt_options.set_transport(Transport::Ws);
        }
        Scheme::Wss => {
            mqtt_options.set_transport(Transport::wss_with_default_config());
        }
    }

    mqtt_options.set_keep_alive(options.keep_alive);
    mqtt_options.set_clean_session(options.clean);

    if let Some(username) = options.username.as_deref() {
        mqtt_options.set_credentials(username, options.password.as_deref().unwrap_or_default());
    }

    Ok(mqtt_options)
}

/// Broker client backed by rumqttc.
#[derive(Debug, Default)]
pub struct MqttService;

impl MqttService {
    pub fn new() -> Self {
        Self
    }
}

impl BrokerClient for MqttService {
    type Handle = MqttConnection;

    fn connect(
        &mut self,
        url: &str,
        options: &ConnectOptions,
        events: EventSink,
    ) -> Result<MqttConnection, TransportError> {
        let client_id = format!("thermoflux_{}", Uuid::new_v4());
        let mqtt_options = mqtt_options(url, &client_id, options)?;

        let (client, eventloop) = AsyncClient::new(mqtt_options, 10);
        info!("Starting MQTT connection {} as '{}'...", events.generation(), client_id);
        let task = tokio::spawn(drive_event_loop(eventloop, events, options.reconnect_period));

        Ok(MqttConnection {
            client,
            task: Some(task),
        })
    }
}

pub struct MqttConnection {
    client: AsyncClient,
    task: Option<JoinHandle<()>>,
}

impl BrokerHandle for MqttConnection {
    fn subscribe(&mut self, topic: &str) -> Result<(), SubscribeError> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| SubscribeError {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn end(&mut self) -> Result<(), TransportError> {
        let result = self
            .client
            .try_disconnect()
            .map_err(|e| TransportError::Client(e.to_string()));
        if let Some(task) = self.task.take() {
            stop_after_grace(task);
        }
        result
    }
}

// The event loop stops on its own once DISCONNECT is on the wire; if it is
// still stuck connecting or backing off when the grace period ends, abort it.
fn stop_after_grace(mut task: JoinHandle<()>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                    debug!("MQTT event loop did not stop in time, aborting it.");
                    task.abort();
                }
            });
        }
        Err(_) => task.abort(),
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, events: EventSink, reconnect_period: Option<Duration>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnect sent, stopping MQTT event loop.");
                return;
            }
            Ok(event) => {
                if let Some(event) = translate_event(event) {
                    if !events.send(event) {
                        debug!("Connection manager is gone, stopping MQTT event loop.");
                        return;
                    }
                }
            }
            Err(e) => {
                error!("Error in MQTT event loop: {:?}", e);
                events.send(BrokerEvent::TransportError(e.to_string()));
                events.send(BrokerEvent::Closed);

                let Some(period) = reconnect_period else {
                    info!("Automatic reconnect disabled, stopping MQTT event loop.");
                    return;
                };

                warn!("Lost connection to MQTT broker. Retrying in {:?}...", period);
                sleep(period).await;
                if !events.send(BrokerEvent::Reconnecting) {
                    return;
                }
            }
        }
    }
}

fn translate_event(event: Event) -> Option<BrokerEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(BrokerEvent::Connected),
        Event::Incoming(Packet::Publish(publish)) => Some(BrokerEvent::MessageReceived {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }),
        Event::Incoming(Packet::SubAck(ack)) => {
            if ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
            {
                Some(BrokerEvent::SubscribeFailed(
                    "broker rejected the subscription".to_string(),
                ))
            } else {
                Some(BrokerEvent::Subscribed)
            }
        }
        Event::Incoming(Packet::Disconnect) => Some(BrokerEvent::Closed),
        _ => {
            debug!("Unhandled event: {:?}", event);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::DashboardEvent;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish, SubAck};
    use tokio::sync::mpsc;

    fn options() -> ConnectOptions {
        ConnectOptions {
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            clean: true,
            reconnect_period: Some(Duration::from_millis(2000)),
            keep_alive: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_parse_endpoints() {
        let endpoint = BrokerEndpoint::parse("mqtt://broker.local:1884").unwrap();
        assert_eq!(endpoint.scheme, Scheme::Tcp);
        assert_eq!(endpoint.host, "broker.local");
        assert_eq!(endpoint.port, 1884);

        let endpoint = BrokerEndpoint::parse("wss://user:pw@broker.example.com/mqtt").unwrap();
        assert_eq!(endpoint.scheme, Scheme::Wss);
        assert_eq!(endpoint.host, "broker.example.com");
        assert_eq!(endpoint.port, 443);

        assert_eq!(BrokerEndpoint::parse("mqtts://broker").unwrap().port, 8883);
        assert_eq!(BrokerEndpoint::parse("tcp://10.0.0.5").unwrap().port, 1883);
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        assert!(BrokerEndpoint::parse("broker.local:1883").is_err());
        assert!(BrokerEndpoint::parse("http://broker.local").is_err());
        assert!(BrokerEndpoint::parse("mqtt://:1883").is_err());
        assert!(BrokerEndpoint::parse("mqtt://broker:port").is_err());
    }

    #[test]
    fn test_mqtt_options_from_connect_options() {
        let mqtt_options = mqtt_options("mqtt://broker.local:1883", "thermoflux_test", &options()).unwrap();

        assert_eq!(mqtt_options.broker_address(), ("broker.local".to_string(), 1883));
        assert_eq!(mqtt_options.keep_alive(), Duration::from_secs(30));
        assert!(mqtt_options.clean_session());
        assert_eq!(
            mqtt_options.credentials(),
            Some(("user".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_translate_incoming_packets() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)));
        assert_eq!(translate_event(connack), Some(BrokerEvent::Connected));

        let publish = Event::Incoming(Packet::Publish(Publish::new(
            "sensors/tc74",
            QoS::AtMostOnce,
            "21,5",
        )));
        assert_eq!(
            translate_event(publish),
            Some(BrokerEvent::MessageReceived {
                topic: "sensors/tc74".to_string(),
                payload: b"21,5".to_vec(),
            })
        );

        let rejected = Event::Incoming(Packet::SubAck(SubAck::new(1, vec![SubscribeReasonCode::Failure])));
        assert!(matches!(translate_event(rejected), Some(BrokerEvent::SubscribeFailed(_))));

        let granted = Event::Incoming(Packet::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Success(QoS::AtMostOnce)],
        )));
        assert_eq!(translate_event(granted), Some(BrokerEvent::Subscribed));

        assert_eq!(translate_event(Event::Incoming(Packet::PingResp)), None);
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<DashboardEvent>) -> Option<BrokerEvent> {
        match timeout(Duration::from_secs(5), rx.recv()).await.expect("event loop stalled") {
            Some(DashboardEvent::Broker { event, .. }) => Some(event),
            Some(other) => panic!("unexpected event {:?}", other),
            None => None,
        }
    }

    fn unreachable_connection(
        reconnect_period: Option<Duration>,
    ) -> (MqttConnection, mpsc::UnboundedReceiver<DashboardEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let options = ConnectOptions {
            reconnect_period,
            ..options()
        };
        let connection = MqttService::new()
            .connect("mqtt://127.0.0.1:1", &options, EventSink::new(1, tx))
            .unwrap();
        (connection, rx)
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_then_retries() {
        let (mut connection, mut rx) = unreachable_connection(Some(Duration::from_millis(100)));

        assert!(matches!(next_event(&mut rx).await, Some(BrokerEvent::TransportError(_))));
        assert_eq!(next_event(&mut rx).await, Some(BrokerEvent::Closed));
        assert_eq!(next_event(&mut rx).await, Some(BrokerEvent::Reconnecting));
        assert!(matches!(next_event(&mut rx).await, Some(BrokerEvent::TransportError(_))));

        // Ending the connection stops the retry loop within the grace period.
        let _ = connection.end();
        while next_event(&mut rx).await.is_some() {}
    }

    #[tokio::test]
    async fn test_unreachable_broker_without_auto_reconnect_stops() {
        let (_connection, mut rx) = unreachable_connection(None);

        assert!(matches!(next_event(&mut rx).await, Some(BrokerEvent::TransportError(_))));
        assert_eq!(next_event(&mut rx).await, Some(BrokerEvent::Closed));
        assert_eq!(next_event(&mut rx).await, None);
    }
}
