//! MQTT transport for the ESP32 on the ESP-IDF client.
//!
//! [`Esp32Mqtt`] implements [`MqttClient`] without blocking the node loop:
//! the ESP-IDF connection is drained by a background thread that forwards
//! connect/disconnect/message events over a channel, and publishes are
//! enqueued instead of sent inline.
//!
//! # Example
//!
//! ```ignore
//! use mailbox_node::hal::esp32::Esp32Mqtt;
//! use mailbox_node::config::MqttConfig;
//!
//! let config = MqttConfig::default().with_host("10.42.0.1");
//! let mqtt = Esp32Mqtt::new(&config);
//! // The session calls `connect` with the device identity and last will
//! ```

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use esp_idf_svc::mqtt::client::{
    EspMqttClient, EspMqttConnection, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};
use log::{debug, info, warn};

use crate::config::MqttConfig;
use crate::traits::{ConnectOptions, MqttClient, MqttMessage};

/// Stack size of the event thread.
const EVENT_THREAD_STACK: usize = 6 * 1024;

/// Events forwarded from the connection thread.
enum TransportEvent {
    Connected,
    Disconnected,
    Message(MqttMessage),
}

/// ESP-IDF MQTT transport.
pub struct Esp32Mqtt {
    broker_url: String,
    client: Option<EspMqttClient<'static>>,
    events: Option<Receiver<TransportEvent>>,
    connected: bool,
    inbox: VecDeque<MqttMessage>,
}

impl Esp32Mqtt {
    /// Create a transport for the configured broker; nothing connects until
    /// [`MqttClient::connect`].
    pub fn new(config: &MqttConfig) -> Self {
        Self {
            broker_url: format!("mqtt://{}:{}", config.host.as_str(), config.port),
            client: None,
            events: None,
            connected: false,
            inbox: VecDeque::new(),
        }
    }

    /// Broker URL this transport connects to.
    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    fn shutdown(&mut self) {
        // Dropping the client ends the connection thread
        self.client = None;
        self.events = None;
        self.connected = false;
        self.inbox.clear();
    }
}

// ============================================================================
// MqttClient Trait Implementation
// ============================================================================

/// Error type for ESP32 MQTT operations.
#[derive(Debug)]
pub struct Esp32MqttError(pub String);

impl core::fmt::Display for Esp32MqttError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "MQTT error: {}", self.0)
    }
}

impl std::error::Error for Esp32MqttError {}

impl MqttClient for Esp32Mqtt {
    type Error = Esp32MqttError;

    fn connect(&mut self, options: &ConnectOptions) -> Result<(), Self::Error> {
        self.shutdown();

        let has_auth = options.has_auth();
        let mqtt_config = MqttClientConfiguration {
            client_id: Some(options.client_id.as_str()),
            username: has_auth.then_some(options.username.as_str()),
            password: has_auth.then_some(options.password.as_str()),
            keep_alive_interval: Some(Duration::from_secs(u64::from(options.keep_alive_secs))),
            lwt: Some(LwtConfiguration {
                topic: options.last_will.topic.as_str(),
                payload: &options.last_will.payload,
                qos: QoS::AtLeastOnce,
                retain: options.last_will.retain,
            }),
            ..Default::default()
        };

        let (client, connection) = EspMqttClient::new(&self.broker_url, &mqtt_config)
            .map_err(|e| Esp32MqttError(format!("{:?}", e)))?;

        let (tx, rx) = channel();
        thread::Builder::new()
            .stack_size(EVENT_THREAD_STACK)
            .spawn(move || handle_mqtt_events(connection, tx))
            .map_err(|e| Esp32MqttError(e.to_string()))?;

        info!("MQTT connecting to {}", self.broker_url);
        self.client = Some(client);
        self.events = Some(rx);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| Esp32MqttError("not connected".into()))?;
        let qos = if retain {
            QoS::AtLeastOnce
        } else {
            QoS::AtMostOnce
        };
        client
            .enqueue(topic, qos, retain, payload)
            .map_err(|e| Esp32MqttError(format!("{:?}", e)))?;
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| Esp32MqttError("not connected".into()))?;
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| Esp32MqttError(format!("{:?}", e)))?;
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.inbox.pop_front()
    }

    fn poll(&mut self) -> Result<(), Self::Error> {
        let Some(events) = self.events.as_ref() else {
            return Ok(());
        };

        let mut lost = false;
        loop {
            match events.try_recv() {
                Ok(TransportEvent::Connected) => self.connected = true,
                Ok(TransportEvent::Message(msg)) => self.inbox.push_back(msg),
                Ok(TransportEvent::Disconnected) | Err(TryRecvError::Disconnected) => {
                    lost = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        if lost {
            self.shutdown();
            return Err(Esp32MqttError("connection closed".into()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn handle_mqtt_events(mut connection: EspMqttConnection, tx: Sender<TransportEvent>) {
    while let Ok(event) = connection.next() {
        let forward = match event.payload() {
            EventPayload::Connected(_) => {
                info!("MQTT connected");
                TransportEvent::Connected
            }
            EventPayload::Disconnected => {
                warn!("MQTT disconnected");
                TransportEvent::Disconnected
            }
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => TransportEvent::Message(MqttMessage::new(topic, data)),
            EventPayload::Error(e) => {
                warn!("MQTT error: {:?}", e);
                continue;
            }
            _ => continue,
        };
        if tx.send(forward).is_err() {
            break;
        }
    }
    debug!("MQTT event thread stopped");
}
