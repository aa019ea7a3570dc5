//! Network abstraction trait for the retained pub/sub transport.
//!
//! The node talks to its broker through the [`MqttClient`] trait. The
//! session layer ([`crate::session`]) drives connect, subscribe and publish on
//! top of it; the transport itself only moves bytes.
//!
//! # Topics
//!
//! All device topics are prefixed with the device identity `D`:
//!
//! ```text
//! /devices                          - registration announcement (payload D)
//! /D/online                         - "connected" / "disconnected" (retained, last will)
//! /D/currentWeight                  - settled weight (retained)
//! /D/calibration/scaleOffset        - offset calibration result
//! /D/calibration/scaleValue         - factor calibration result
//! /server/online                    - server liveness
//! /D                                - registration acknowledgement
//! /D/command/{CalcOffset,CalibrateScale,ApplyCalibration,CancelCalibration}
//! ```

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

// ============================================================================
// MQTT Client Trait (Sync-First Design)
// ============================================================================

/// MQTT client trait for pub/sub messaging.
///
/// This trait uses a **sync-first design** that works on both ESP32 (blocking
/// I/O on a background thread) and desktop.
///
/// # Implementation Notes
///
/// - `connect` starts a connection attempt and may complete asynchronously;
///   the session watches `is_connected` to learn the result
/// - `try_recv` and `poll` are non-blocking and must never wait on the network
/// - `poll` reports a lost or refused connection as an error exactly once
///
/// # Example
///
/// ```rust,ignore
/// use mailbox_node::traits::MqttClient;
///
/// fn publish_weight<M: MqttClient>(client: &mut M, grams: f64) {
///     let payload = format!("{:.1}", grams);
///     client.publish("/AA:BB:CC:DD:EE:FF/currentWeight", payload.as_bytes(), true).unwrap();
/// }
/// ```
pub trait MqttClient {
    /// Error type for MQTT operations.
    type Error: core::fmt::Debug;

    /// Start connecting to the broker with the given identity and last will.
    ///
    /// Any previous connection is dropped first.
    fn connect(&mut self, options: &ConnectOptions) -> Result<(), Self::Error>;

    /// Publish a message to a topic.
    ///
    /// # Arguments
    /// - `topic`: MQTT topic path
    /// - `payload`: Message bytes
    /// - `retain`: If true, broker keeps message for new subscribers
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;

    /// Subscribe to a topic.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Try to receive the next message (non-blocking).
    ///
    /// Returns `None` if no message is available. This should never block.
    fn try_recv(&mut self) -> Option<MqttMessage>;

    /// Service the transport without blocking.
    ///
    /// Returns an error if the connection failed or dropped since the last
    /// call. The default implementation does nothing.
    fn poll(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Check if connected to broker.
    fn is_connected(&self) -> bool;
}

/// Broker-held message published on the client's behalf after an unclean
/// disconnect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastWill {
    /// Topic the will is published to.
    pub topic: String,
    /// Will payload.
    pub payload: Vec<u8>,
    /// Whether the broker retains the will message.
    pub retain: bool,
}

/// Parameters for a broker connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Stable client identity (the device hardware address).
    pub client_id: String,
    /// Username (empty = no auth).
    pub username: String,
    /// Password.
    pub password: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Last will registered with the broker.
    pub last_will: LastWill,
}

impl ConnectOptions {
    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

/// An MQTT message received from a subscription.
///
/// Contains the topic and payload of a published message.
#[derive(Clone, Debug)]
pub struct MqttMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Create a new MQTT message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }
}
