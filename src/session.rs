//! Broker session lifecycle on top of an [`MqttClient`].
//!
//! ```text
//! Disconnected --connect--> Connecting --transport up--> Connected
//!      ^                        |                            |
//!      +---- failure/timeout ---+------- connection lost ----+
//! ```
//!
//! On every successful connect the session subscribes to all inbound topics,
//! publishes a retained `"connected"` on its online topic (the last will
//! publishes `"disconnected"` there) and announces itself once on
//! `/devices`. Inbound messages are decoded synchronously by
//! [`Session::service`]; calibration commands are handed back to the caller.
//!
//! Reconnect pacing is not done here; the controller decides when to call
//! [`Session::connect`] again.

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::config::MqttConfig;
use crate::topics::{Command, DeviceTopics, PubTopic, SubTopic, OFFLINE_PAYLOAD, ONLINE_PAYLOAD};
use crate::traits::{ConnectOptions, LastWill, MqttClient, MqttMessage};

/// Connection state of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; [`Session::connect`] may be called.
    Disconnected,
    /// Connect requested, waiting for the transport.
    Connecting {
        /// Time the attempt started.
        since_ms: u64,
    },
    /// Subscribed and announced.
    Connected,
}

/// Session failures. All of them are transport failures and end in
/// [`SessionState::Disconnected`], except `NotConnected` and a `Publish`
/// of application data. A failed registration publish disconnects too, so
/// the announcement is retried with the next connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError<E> {
    /// The transport refused or failed the connection.
    Connect(E),
    /// The connection dropped after it was established.
    ConnectionLost(E),
    /// The transport reports the connection down without an error value.
    ConnectionClosed,
    /// Subscribing during the connect sequence failed.
    Subscribe(E),
    /// A publish failed.
    Publish(E),
    /// Operation requires a connected session.
    NotConnected,
    /// The transport did not come up within the connect timeout.
    ConnectTimeout,
}

impl<E: core::fmt::Debug> core::fmt::Display for SessionError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SessionError::Connect(e) => write!(f, "connect failed: {:?}", e),
            SessionError::ConnectionLost(e) => write!(f, "connection lost: {:?}", e),
            SessionError::ConnectionClosed => write!(f, "connection closed"),
            SessionError::Subscribe(e) => write!(f, "subscribe failed: {:?}", e),
            SessionError::Publish(e) => write!(f, "publish failed: {:?}", e),
            SessionError::NotConnected => write!(f, "not connected"),
            SessionError::ConnectTimeout => write!(f, "connect timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for SessionError<E> {}

/// Broker session for one device identity.
pub struct Session<C: MqttClient> {
    client: C,
    topics: DeviceTopics,
    options: ConnectOptions,
    connect_timeout_ms: u32,
    state: SessionState,
    registered: bool,
    server_online: Option<bool>,
    last_attempt_ms: Option<u64>,
}

impl<C: MqttClient> Session<C> {
    /// Create a disconnected session.
    ///
    /// The client identity is `device_id`; the last will is
    /// `/<device_id>/online` = `"disconnected"`, retained.
    pub fn new(client: C, device_id: &str, mqtt: &MqttConfig, connect_timeout_ms: u32) -> Self {
        let topics = DeviceTopics::new(device_id);
        let options = ConnectOptions {
            client_id: device_id.into(),
            username: String::from(mqtt.username.as_str()),
            password: String::from(mqtt.password.as_str()),
            keep_alive_secs: mqtt.keep_alive_secs,
            last_will: LastWill {
                topic: topics.online().into(),
                payload: OFFLINE_PAYLOAD.as_bytes().to_vec(),
                retain: true,
            },
        };

        Self {
            client,
            topics,
            options,
            connect_timeout_ms,
            state: SessionState::Disconnected,
            registered: false,
            server_online: None,
            last_attempt_ms: None,
        }
    }

    /// Start a connection attempt.
    ///
    /// Does nothing unless disconnected. If the transport connects
    /// synchronously the subscribe/announce sequence runs right away,
    /// otherwise [`service`](Self::service) completes it.
    pub fn connect(&mut self, now_ms: u64) -> Result<(), SessionError<C::Error>> {
        if self.state != SessionState::Disconnected {
            return Ok(());
        }

        self.last_attempt_ms = Some(now_ms);
        self.registered = false;
        self.server_online = None;
        info!("Connecting to broker as {}", self.options.client_id);

        if let Err(e) = self.client.connect(&self.options) {
            warn!("Broker connect failed: {:?}", e);
            return Err(SessionError::Connect(e));
        }
        self.state = SessionState::Connecting { since_ms: now_ms };

        if self.client.is_connected() {
            self.on_connected()?;
        }
        Ok(())
    }

    /// Service the transport and decode inbound messages.
    ///
    /// Never blocks. Returns the calibration commands received since the last
    /// call; server liveness and registration acks are handled internally.
    pub fn service(&mut self, now_ms: u64) -> Result<Vec<Command>, SessionError<C::Error>> {
        if self.state == SessionState::Disconnected {
            return Ok(Vec::new());
        }

        if let Err(e) = self.client.poll() {
            let err = match self.state {
                SessionState::Connected => SessionError::ConnectionLost(e),
                _ => SessionError::Connect(e),
            };
            warn!("Broker session failed: {}", err);
            self.set_disconnected();
            return Err(err);
        }

        match self.state {
            SessionState::Connecting { since_ms } => {
                if self.client.is_connected() {
                    self.on_connected()?;
                } else if now_ms.saturating_sub(since_ms) >= u64::from(self.connect_timeout_ms) {
                    warn!("Broker connect timed out after {}ms", self.connect_timeout_ms);
                    self.set_disconnected();
                    return Err(SessionError::ConnectTimeout);
                } else {
                    return Ok(Vec::new());
                }
            }
            SessionState::Connected => {
                if !self.client.is_connected() {
                    warn!("Broker connection lost");
                    self.set_disconnected();
                    return Err(SessionError::ConnectionClosed);
                }
            }
            SessionState::Disconnected => {}
        }

        let mut commands = Vec::new();
        while let Some(msg) = self.client.try_recv() {
            if let Some(cmd) = self.handle_message(&msg)? {
                commands.push(cmd);
            }
        }
        Ok(commands)
    }

    /// Publish an outbound message with its fixed retain flag.
    pub fn publish(
        &mut self,
        topic: PubTopic,
        payload: &[u8],
    ) -> Result<(), SessionError<C::Error>> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let (topic_str, payload) = self.topics.encode(topic, payload);
        debug!("Publish {} ({} bytes)", topic_str, payload.len());
        self.client
            .publish(topic_str, payload, topic.retained())
            .map_err(SessionError::Publish)
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once subscribed and announced.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// True once the server acknowledged this connection's registration.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Last server liveness seen on this connection (`None` = unknown).
    pub fn server_online(&self) -> Option<bool> {
        self.server_online
    }

    /// Start time of the most recent connection attempt.
    pub fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }

    /// Topics of this device.
    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    /// Options used for every connect.
    pub fn connect_options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Access the transport.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mutable access to the transport.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    fn on_connected(&mut self) -> Result<(), SessionError<C::Error>> {
        for sub in SubTopic::SUBSCRIBED {
            let topic = self.topics.sub_topic(sub);
            if let Err(e) = self.client.subscribe(topic) {
                warn!("Subscribe to {} failed: {:?}", topic, e);
                self.set_disconnected();
                return Err(SessionError::Subscribe(e));
            }
            debug!("Subscribed to {}", topic);
        }

        if let Err(e) = self
            .client
            .publish(self.topics.online(), ONLINE_PAYLOAD.as_bytes(), true)
        {
            warn!("Online announcement failed: {:?}", e);
            self.set_disconnected();
            return Err(SessionError::Publish(e));
        }

        self.state = SessionState::Connected;
        info!("Connected to broker");
        self.register()
    }

    /// Announce on `/devices`. A failed announcement drops the session so
    /// the controller's reconnect path retries it.
    fn register(&mut self) -> Result<(), SessionError<C::Error>> {
        info!("Registering device {}", self.topics.id());
        if let Err(e) = self.publish(PubTopic::RegisterDevice, &[]) {
            warn!("Registration failed: {}", e);
            self.set_disconnected();
            return Err(e);
        }
        Ok(())
    }

    fn handle_message(
        &mut self,
        msg: &MqttMessage,
    ) -> Result<Option<Command>, SessionError<C::Error>> {
        let topic = self.topics.decode(&msg.topic);
        match topic {
            SubTopic::ServerOnline => {
                match msg.payload_str().map(str::trim) {
                    Some(ONLINE_PAYLOAD) => {
                        let was_offline = self.server_online == Some(false);
                        self.server_online = Some(true);
                        info!("Server online");
                        if was_offline {
                            self.register()?;
                        }
                    }
                    Some(OFFLINE_PAYLOAD) => {
                        self.server_online = Some(false);
                        self.registered = false;
                        warn!("Server offline");
                    }
                    _ => warn!("Unknown server state: {:?}", msg.payload),
                }
                Ok(None)
            }
            SubTopic::DeviceRegistered => {
                if !self.registered {
                    info!("Device registered");
                }
                self.registered = true;
                Ok(None)
            }
            SubTopic::Undefined => {
                warn!("Message on undefined topic {}", msg.topic);
                Ok(None)
            }
            _ => Ok(Command::parse(topic, &msg.payload)),
        }
    }

    fn set_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
        self.registered = false;
    }
}
