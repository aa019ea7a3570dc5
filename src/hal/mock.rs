//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware and network traits,
//! enabling development and testing on desktop without physical hardware.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockLoadCell`] | [`LoadCell`] | Scripted raw readings, injectable failures |
//! | [`MockStore`] | [`CalibrationStore`] | In-memory calibration, save counter |
//! | [`MockIndicator`] | [`StatusIndicator`] | Records every LED pattern |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MockMqtt`] | [`MqttClient`] | Captures connect/pub/sub operations |
//!
//! # Example
//!
//! ```rust
//! use mailbox_node::config::ScaleConfig;
//! use mailbox_node::hal::{MockLoadCell, MockStore};
//! use mailbox_node::weight::WeightEngine;
//!
//! let mut cell = MockLoadCell::new();
//! cell.queue_readings(&[1000]);
//! let mut engine = WeightEngine::new(cell, MockStore::new(), ScaleConfig::default(), 0);
//!
//! // Unloaded scale reads 1000 counts
//! assert_eq!(engine.begin_offset_calibration(), Some(1000.0));
//! ```
//!
//! [`LoadCell`]: crate::traits::LoadCell
//! [`CalibrationStore`]: crate::traits::CalibrationStore
//! [`StatusIndicator`]: crate::traits::StatusIndicator
//! [`Clock`]: crate::traits::Clock
//! [`MqttClient`]: crate::traits::MqttClient

extern crate alloc;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

use crate::status::LedPattern;
use crate::traits::{
    CalibrationStore, Clock, ConnectOptions, LoadCell, MqttClient, MqttMessage, StatusIndicator,
};
use crate::weight::CalibrationState;

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock load cell for testing.
///
/// Returns queued readings in FIFO order; once the queue is empty the last
/// reading repeats, like a scale with a constant load.
///
/// # Example
///
/// ```rust
/// use mailbox_node::hal::MockLoadCell;
/// use mailbox_node::traits::LoadCell;
///
/// let mut cell = MockLoadCell::new();
/// cell.queue_readings(&[5, 7]);
///
/// assert_eq!(cell.read_raw(), Ok(5));
/// assert_eq!(cell.read_raw(), Ok(7));
/// assert_eq!(cell.read_raw(), Ok(7)); // held
///
/// cell.fail = true;
/// assert!(cell.read_raw().is_err());
/// ```
#[derive(Debug, Default)]
pub struct MockLoadCell {
    queue: VecDeque<i32>,
    last: i32,
    /// When set, every read fails.
    pub fail: bool,
    /// Number of successful reads.
    pub reads: usize,
}

impl MockLoadCell {
    /// Creates a load cell that reads 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one reading.
    pub fn queue_reading(&mut self, raw: i32) {
        self.queue.push_back(raw);
    }

    /// Queue several readings.
    pub fn queue_readings(&mut self, raws: &[i32]) {
        self.queue.extend(raws.iter().copied());
    }

    /// Drop queued readings and hold `raw` from now on.
    pub fn hold(&mut self, raw: i32) {
        self.queue.clear();
        self.last = raw;
    }
}

impl LoadCell for MockLoadCell {
    type Error = ();

    fn read_raw(&mut self) -> Result<i32, ()> {
        if self.fail {
            return Err(());
        }
        if let Some(raw) = self.queue.pop_front() {
            self.last = raw;
        }
        self.reads += 1;
        Ok(self.last)
    }
}

/// Mock calibration store for testing.
///
/// # Example
///
/// ```rust
/// use mailbox_node::hal::MockStore;
/// use mailbox_node::traits::CalibrationStore;
/// use mailbox_node::weight::CalibrationState;
///
/// let mut store = MockStore::new();
/// assert!(!store.load().unwrap().initialized);
///
/// store.save(&CalibrationState::calibrated(120, 0.5)).unwrap();
/// assert_eq!(store.saves, 1);
/// assert!(store.load().unwrap().initialized);
/// ```
#[derive(Debug, Default)]
pub struct MockStore {
    /// Persisted calibration.
    pub state: CalibrationState,
    /// Number of successful saves.
    pub saves: usize,
    /// When set, `load` fails.
    pub fail_load: bool,
    /// When set, `save` fails and nothing is written.
    pub fail_save: bool,
}

impl MockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `state`.
    pub fn with_state(state: CalibrationState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }
}

impl CalibrationStore for MockStore {
    type Error = ();

    fn load(&mut self) -> Result<CalibrationState, ()> {
        if self.fail_load {
            return Err(());
        }
        Ok(self.state)
    }

    fn save(&mut self, state: &CalibrationState) -> Result<(), ()> {
        if self.fail_save {
            return Err(());
        }
        self.state = *state;
        self.saves += 1;
        Ok(())
    }
}

/// Mock status indicator for testing.
///
/// Records every pattern written.
#[derive(Debug, Default)]
pub struct MockIndicator {
    /// Patterns in the order they were shown.
    pub shown: Vec<LedPattern>,
    /// When set, `show` fails.
    pub fail: bool,
}

impl MockIndicator {
    /// Creates a new mock indicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pattern currently on the LEDs.
    pub fn current(&self) -> Option<LedPattern> {
        self.shown.last().copied()
    }
}

impl StatusIndicator for MockIndicator {
    type Error = ();

    fn show(&mut self, pattern: LedPattern) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.shown.push(pattern);
        Ok(())
    }
}

/// Mock clock for testing.
///
/// Provides a controllable time source for testing time-dependent behavior.
///
/// # Example
///
/// ```rust
/// use mailbox_node::hal::MockClock;
/// use mailbox_node::traits::Clock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.set(1000);
/// assert_eq!(clock.now_ms(), 1000);
///
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Default)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock MQTT client for testing.
///
/// Records connect/publish/subscribe operations and allows injecting
/// incoming messages and failures. `connect` succeeds synchronously unless
/// `connect_immediately` is cleared, in which case the test flips
/// `connected` itself.
///
/// # Example
///
/// ```rust
/// use mailbox_node::hal::MockMqtt;
/// use mailbox_node::traits::MqttClient;
///
/// let mut mqtt = MockMqtt::new();
/// assert!(!mqtt.is_connected());
///
/// // Queue incoming message
/// mqtt.queue_message("/server/online", b"connected".to_vec());
/// assert_eq!(mqtt.try_recv().unwrap().topic, "/server/online");
///
/// mqtt.publish("/devices", b"D", false).unwrap();
/// assert_eq!(mqtt.published_to("/devices").len(), 1);
/// ```
#[derive(Debug)]
pub struct MockMqtt {
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Topics that have been subscribed to.
    pub subscriptions: Vec<String>,
    /// Queue of incoming messages returned by `try_recv()`.
    pub incoming: VecDeque<MqttMessage>,
    /// Whether the client is connected.
    pub connected: bool,
    /// Options of the most recent `connect`.
    pub last_connect: Option<ConnectOptions>,
    /// Number of `connect` calls.
    pub connects: usize,
    /// `connect` marks the client connected right away.
    pub connect_immediately: bool,
    /// When set, `connect` fails.
    pub fail_connect: bool,
    /// When set, `subscribe` fails.
    pub fail_subscribe: bool,
    /// When set, `publish` fails.
    pub fail_publish: bool,
    /// Fail the next publish to this topic, then clear.
    pub reject_next_publish_to: Option<String>,
    /// Set by [`drop_connection`](Self::drop_connection); reported by the next `poll`.
    pub poll_error: bool,
}

impl Default for MockMqtt {
    fn default() -> Self {
        Self {
            published: Vec::new(),
            subscriptions: Vec::new(),
            incoming: VecDeque::new(),
            connected: false,
            last_connect: None,
            connects: 0,
            connect_immediately: true,
            fail_connect: false,
            fail_subscribe: false,
            fail_publish: false,
            reject_next_publish_to: None,
            poll_error: false,
        }
    }
}

impl MockMqtt {
    /// Creates a new, disconnected mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an incoming message
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming.push_back(MqttMessage::new(topic, payload));
    }

    /// Simulate the broker dropping the connection.
    pub fn drop_connection(&mut self) {
        self.connected = false;
        self.poll_error = true;
    }

    /// Check if a topic was subscribed to
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t == topic)
    }

    /// Get published messages for a topic
    pub fn published_to(&self, topic: &str) -> Vec<&(String, Vec<u8>, bool)> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .collect()
    }
}

impl MqttClient for MockMqtt {
    type Error = ();

    fn connect(&mut self, options: &ConnectOptions) -> Result<(), ()> {
        self.connects += 1;
        self.last_connect = Some(options.clone());
        if self.fail_connect {
            self.connected = false;
            return Err(());
        }
        self.poll_error = false;
        self.connected = self.connect_immediately;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ()> {
        if self.fail_publish {
            return Err(());
        }
        if self.reject_next_publish_to.as_deref() == Some(topic) {
            self.reject_next_publish_to = None;
            return Err(());
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ()> {
        if self.fail_subscribe {
            return Err(());
        }
        self.subscriptions.push(topic.into());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        self.incoming.pop_front()
    }

    fn poll(&mut self) -> Result<(), ()> {
        if self.poll_error {
            self.poll_error = false;
            return Err(());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DisplayMode;
    use crate::traits::LastWill;

    // =========================================================================
    // MockLoadCell Tests
    // =========================================================================

    #[test]
    fn load_cell_defaults_to_zero() {
        let mut cell = MockLoadCell::new();
        assert_eq!(cell.read_raw(), Ok(0));
        assert_eq!(cell.reads, 1);
    }

    #[test]
    fn load_cell_hold_replaces_queue() {
        let mut cell = MockLoadCell::new();
        cell.queue_readings(&[1, 2, 3]);
        cell.hold(9);
        assert_eq!(cell.read_raw(), Ok(9));
        assert_eq!(cell.read_raw(), Ok(9));
    }

    #[test]
    fn failed_reads_are_not_counted() {
        let mut cell = MockLoadCell::new();
        cell.fail = true;
        assert!(cell.read_raw().is_err());
        assert_eq!(cell.reads, 0);
    }

    // =========================================================================
    // MockStore Tests
    // =========================================================================

    #[test]
    fn store_save_failure_keeps_state() {
        let mut store = MockStore::with_state(CalibrationState::calibrated(10, 1.5));
        store.fail_save = true;
        assert!(store.save(&CalibrationState::default()).is_err());
        assert_eq!(store.state, CalibrationState::calibrated(10, 1.5));
        assert_eq!(store.saves, 0);
    }

    // =========================================================================
    // MockIndicator Tests
    // =========================================================================

    #[test]
    fn indicator_records_patterns() {
        let mut led = MockIndicator::new();
        assert!(led.current().is_none());
        led.show(DisplayMode::Fault.pattern()).unwrap();
        led.show(DisplayMode::Idle.pattern()).unwrap();
        assert_eq!(led.shown.len(), 2);
        assert_eq!(led.current(), Some(LedPattern::OFF));
    }

    // =========================================================================
    // MockMqtt Tests
    // =========================================================================

    fn options() -> ConnectOptions {
        ConnectOptions {
            client_id: "D".into(),
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 15,
            last_will: LastWill {
                topic: "/D/online".into(),
                payload: b"disconnected".to_vec(),
                retain: true,
            },
        }
    }

    #[test]
    fn mqtt_connect_records_options() {
        let mut mqtt = MockMqtt::new();
        mqtt.connect(&options()).unwrap();
        assert!(mqtt.is_connected());
        assert_eq!(mqtt.connects, 1);
        assert_eq!(mqtt.last_connect.as_ref().unwrap().last_will.topic, "/D/online");
    }

    #[test]
    fn mqtt_connect_failure() {
        let mut mqtt = MockMqtt::new();
        mqtt.fail_connect = true;
        assert!(mqtt.connect(&options()).is_err());
        assert!(!mqtt.is_connected());
        assert_eq!(mqtt.connects, 1);
    }

    #[test]
    fn mqtt_drop_connection_reports_once() {
        let mut mqtt = MockMqtt::new();
        mqtt.connect(&options()).unwrap();
        mqtt.drop_connection();
        assert!(!mqtt.is_connected());
        assert!(mqtt.poll().is_err());
        assert!(mqtt.poll().is_ok());
    }

    #[test]
    fn mqtt_messages_fifo() {
        let mut mqtt = MockMqtt::new();
        mqtt.queue_message("/a", b"1".to_vec());
        mqtt.queue_message("/b", b"2".to_vec());
        assert_eq!(mqtt.try_recv().unwrap().topic, "/a");
        assert_eq!(mqtt.try_recv().unwrap().topic, "/b");
        assert!(mqtt.try_recv().is_none());
    }
}
