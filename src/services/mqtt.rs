//! Desktop MQTT transport on top of `rumqttc`.
//!
//! [`RumqttcClient`] implements [`MqttClient`] with the synchronous
//! `rumqttc::Client`. The connection's event loop runs on a background
//! thread and forwards events over a channel, so every trait method returns
//! immediately:
//!
//! - `connect` starts a fresh client and event-loop thread
//! - `poll` drains the channel and reports a dropped connection once
//! - `publish`/`subscribe` use the non-blocking `try_*` requests
//!
//! The event loop never reconnects by itself; the session decides when to
//! call `connect` again.
//!
//! ```ignore
//! use mailbox_node::services::{MqttRuntimeConfig, RumqttcClient};
//!
//! let client = RumqttcClient::new(MqttRuntimeConfig::new("localhost", 1883));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{Client, Event, LastWill as RumqttcLastWill, MqttOptions, Packet, QoS};

use crate::config::MqttConfig as SharedMqttConfig;
use crate::traits::{ConnectOptions, MqttClient, MqttMessage};

// ============================================================================
// Configuration
// ============================================================================

/// Runtime MQTT transport configuration for `rumqttc`.
///
/// This struct uses `String` for runtime compatibility with the `rumqttc` library.
/// For embedded/no-alloc contexts, use [`crate::config::MqttConfig`] which uses
/// fixed-size `ShortString` types and convert with [`MqttRuntimeConfig::from_config`].
#[derive(Debug, Clone)]
pub struct MqttRuntimeConfig {
    /// MQTT broker hostname
    pub host: String,
    /// MQTT broker port
    pub port: u16,
    /// Capacity of the request channel to the event loop
    pub request_capacity: usize,
}

impl Default for MqttRuntimeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            request_capacity: 16,
        }
    }
}

impl MqttRuntimeConfig {
    /// Create a new config with the given broker address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Create from shared MqttConfig
    pub fn from_config(config: &SharedMqttConfig) -> Self {
        Self::new(config.host.as_str(), config.port)
    }

    /// Set the request channel capacity
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    /// Build `rumqttc` options for a connection attempt.
    pub fn mqtt_options(&self, options: &ConnectOptions) -> MqttOptions {
        let mut mqtt = MqttOptions::new(options.client_id.as_str(), self.host.as_str(), self.port);
        mqtt.set_keep_alive(Duration::from_secs(u64::from(options.keep_alive_secs.max(5))));
        mqtt.set_clean_session(true);
        if options.has_auth() {
            mqtt.set_credentials(options.username.as_str(), options.password.as_str());
        }
        mqtt.set_last_will(RumqttcLastWill::new(
            options.last_will.topic.as_str(),
            options.last_will.payload.clone(),
            QoS::AtLeastOnce,
            options.last_will.retain,
        ));
        mqtt
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Events forwarded from the event-loop thread.
#[derive(Debug)]
enum TransportEvent {
    Connected,
    Message(MqttMessage),
    Disconnected(String),
}

/// Blocking-free [`MqttClient`] over `rumqttc`.
pub struct RumqttcClient {
    config: MqttRuntimeConfig,
    client: Option<Client>,
    events: Option<Receiver<TransportEvent>>,
    stop: Arc<AtomicBool>,
    connected: bool,
    inbox: VecDeque<MqttMessage>,
}

impl RumqttcClient {
    /// Create a transport for the given broker; nothing connects until
    /// [`MqttClient::connect`].
    pub fn new(config: MqttRuntimeConfig) -> Self {
        Self {
            config,
            client: None,
            events: None,
            stop: Arc::new(AtomicBool::new(false)),
            connected: false,
            inbox: VecDeque::new(),
        }
    }

    /// Broker address this transport connects to.
    pub fn config(&self) -> &MqttRuntimeConfig {
        &self.config
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(client) = self.client.as_mut() {
            let _ = client.try_disconnect();
        }
        self.client = None;
        self.events = None;
        self.connected = false;
        self.inbox.clear();
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_event_loop(
    mut connection: rumqttc::Connection,
    tx: Sender<TransportEvent>,
    stop: Arc<AtomicBool>,
) {
    for event in connection.iter() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let forward = match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => TransportEvent::Connected,
            Ok(Event::Incoming(Packet::Publish(publish))) => TransportEvent::Message(
                MqttMessage::new(publish.topic.clone(), publish.payload.to_vec()),
            ),
            Ok(_) => continue,
            Err(e) => {
                let _ = tx.send(TransportEvent::Disconnected(e.to_string()));
                break;
            }
        };
        if tx.send(forward).is_err() {
            break;
        }
    }
    debug!("MQTT event loop stopped");
}

impl MqttClient for RumqttcClient {
    type Error = MqttError;

    fn connect(&mut self, options: &ConnectOptions) -> Result<(), MqttError> {
        self.shutdown();

        let mqtt = self.config.mqtt_options(options);
        let (client, connection) = Client::new(mqtt, self.config.request_capacity);
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        thread::Builder::new()
            .name("mqtt-event-loop".into())
            .spawn(move || run_event_loop(connection, tx, thread_stop))
            .map_err(|e| MqttError::Connect(e.to_string()))?;

        info!("MQTT connecting to {}:{}", self.config.host, self.config.port);
        self.client = Some(client);
        self.events = Some(rx);
        self.stop = stop;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), MqttError> {
        let client = self.client.as_mut().ok_or(MqttError::NotConnected)?;
        client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        let client = self.client.as_mut().ok_or(MqttError::NotConnected)?;
        client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.inbox.pop_front()
    }

    fn poll(&mut self) -> Result<(), MqttError> {
        let Some(events) = self.events.as_ref() else {
            return Ok(());
        };

        let mut failure = None;
        loop {
            match events.try_recv() {
                Ok(TransportEvent::Connected) => {
                    info!("MQTT connected to {}:{}", self.config.host, self.config.port);
                    self.connected = true;
                }
                Ok(TransportEvent::Message(msg)) => self.inbox.push_back(msg),
                Ok(TransportEvent::Disconnected(reason)) => {
                    warn!("MQTT connection closed: {}", reason);
                    failure = Some(reason);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    failure = Some("event loop stopped".to_string());
                    break;
                }
            }
        }

        match failure {
            Some(reason) => {
                self.shutdown();
                Err(MqttError::Connect(reason))
            }
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// MQTT-related errors
#[derive(Debug)]
pub enum MqttError {
    /// Failed to connect to broker, or the connection dropped
    Connect(String),
    /// Failed to subscribe to topic
    Subscribe(String),
    /// Failed to publish message
    Publish(String),
    /// No connection has been started
    NotConnected,
}

impl std::fmt::Display for MqttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MqttError::Connect(e) => write!(f, "MQTT connection failed: {}", e),
            MqttError::Subscribe(e) => write!(f, "MQTT subscribe failed: {}", e),
            MqttError::Publish(e) => write!(f, "MQTT publish failed: {}", e),
            MqttError::NotConnected => write!(f, "MQTT not connected"),
        }
    }
}

impl std::error::Error for MqttError {}
