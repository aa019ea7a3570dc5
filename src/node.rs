//! Main node controller that ties everything together.
//!
//! This module provides [`MailboxNode`], the periodic reconciliation loop
//! that owns the weight engine, the status machine, the broker session and
//! the status indicator.
//!
//! # Loop Order
//!
//! Every [`MailboxNode::tick`]:
//!
//! 1. Services the broker session and collects inbound commands
//! 2. Reconnects if disconnected (paced by an exponential backoff)
//! 3. Recomputes `CommunicationError`
//! 4. Polls the weight engine; a settle event is published (retained) and
//!    updates `Occupied`; `ScaleError` follows the hop budget
//! 5. Dispatches calibration commands
//! 6. Leaves the startup phase and updates the indicator on mode change
//!
//! Nothing in `tick` blocks beyond the bounded load-cell reads, and no error
//! escapes it: failures are logged and end up in the status flags.
//!
//! # Example
//!
//! ```rust
//! use mailbox_node::{Config, DeviceConfig, MailboxNode, DisplayMode};
//! use mailbox_node::hal::{MockIndicator, MockLoadCell, MockMqtt, MockStore};
//!
//! let device = DeviceConfig::default().with_id("AA:BB:CC:DD:EE:FF");
//! let config = Config::default().with_device(device);
//! let mut node = MailboxNode::new(
//!     MockLoadCell::new(),
//!     MockStore::new(),
//!     MockMqtt::new(),
//!     MockIndicator::new(),
//!     &config,
//!     0,
//! );
//!
//! // First tick connects, subscribes and registers
//! node.tick(0);
//! assert!(node.session().is_connected());
//! assert_eq!(node.mode(), DisplayMode::Initializing);
//!
//! // Server acknowledges the registration
//! node.session_mut().client_mut().queue_message("/AA:BB:CC:DD:EE:FF", b"".to_vec());
//! node.tick(50);
//! assert_eq!(node.mode(), DisplayMode::Idle);
//! ```

extern crate alloc;
use alloc::vec::Vec;

use log::{error, info, warn};

use crate::config::{Config, NodeConfig};
use crate::session::{Session, SessionState};
use crate::status::{DeviceStatus, DisplayMode, StatusFlag, StatusMachine};
use crate::topics::{format_calibration, format_weight, Command, PubTopic};
use crate::traits::{CalibrationStore, LoadCell, MqttClient, StatusIndicator};
use crate::weight::{CalibrationCommit, SettleEvent, WeightEngine};

/// What happened during one [`MailboxNode::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickOutcome {
    /// Settle event produced this tick.
    pub settled: Option<SettleEvent>,
    /// Commands dispatched this tick, in arrival order.
    pub commands: Vec<Command>,
    /// A connection attempt was started this tick.
    pub connect_attempted: bool,
    /// The display mode changed this tick.
    pub mode_changed: bool,
}

/// Snapshot of the node for logging and diagnostics.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeState {
    /// Current reference weight in grams.
    pub weight_grams: f64,
    /// Current display mode.
    pub mode: DisplayMode,
    /// Active status flags.
    pub status: DeviceStatus,
    /// Broker session is up.
    pub connected: bool,
    /// Server acknowledged the registration.
    pub registered: bool,
    /// Scale calibration is persisted.
    pub calibrated: bool,
}

/// Mailbox sensor node controller.
///
/// # Type Parameters
///
/// - `L`: Load cell ([`LoadCell`])
/// - `S`: Calibration storage ([`CalibrationStore`])
/// - `C`: Broker transport ([`MqttClient`])
/// - `I`: Status LED ([`StatusIndicator`])
///
/// Time is passed into every call, so the same controller runs on the
/// device, on desktop, and under test with a mock clock.
pub struct MailboxNode<L, S, C, I>
where
    L: LoadCell,
    S: CalibrationStore,
    C: MqttClient,
    I: StatusIndicator,
{
    engine: WeightEngine<L, S>,
    status: StatusMachine,
    session: Session<C>,
    indicator: I,
    config: NodeConfig,
    link_up: bool,
    broker_enabled: bool,
    started_ms: u64,
    next_attempt_ms: u64,
    backoff_ms: u32,
    pending_weight: Option<f64>,
    shown_mode: Option<DisplayMode>,
}

impl<L, S, C, I> MailboxNode<L, S, C, I>
where
    L: LoadCell,
    S: CalibrationStore,
    C: MqttClient,
    I: StatusIndicator,
{
    /// Create a node; the first [`tick`](Self::tick) connects right away.
    pub fn new(
        load_cell: L,
        store: S,
        client: C,
        indicator: I,
        config: &Config,
        now_ms: u64,
    ) -> Self {
        let engine = WeightEngine::new(load_cell, store, config.scale.clone(), now_ms);
        let session = Session::new(
            client,
            config.device.id.as_str(),
            &config.mqtt,
            config.node.connect_timeout_ms,
        );

        Self {
            engine,
            status: StatusMachine::new(),
            session,
            indicator,
            config: config.node.clone(),
            link_up: true,
            broker_enabled: config.mqtt.enabled,
            started_ms: now_ms,
            next_attempt_ms: now_ms,
            backoff_ms: config.node.reconnect_backoff_ms,
            pending_weight: None,
            shown_mode: None,
        }
    }

    /// Run one loop iteration - call every `loop_interval_ms`.
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let mode_before = self.status.mode();

        // 1. Network half
        let commands = match self.session.service(now_ms) {
            Ok(commands) => commands,
            Err(e) => {
                warn!("Broker session error: {}", e);
                self.schedule_retry(now_ms);
                Vec::new()
            }
        };

        // 2. Reconnect
        if self.session.state() == SessionState::Disconnected
            && self.link_up
            && self.broker_enabled
            && now_ms >= self.next_attempt_ms
        {
            outcome.connect_attempted = true;
            if let Err(e) = self.session.connect(now_ms) {
                warn!("Broker connect failed: {}", e);
                self.schedule_retry(now_ms);
            }
        }
        if self.session.is_connected() {
            self.backoff_ms = self.config.reconnect_backoff_ms;
        }

        // 3. Communication health
        let comm_error = !self.link_up
            || !self.session.is_connected()
            || !self.session.is_registered()
            || self.session.server_online() == Some(false);
        self.status.set_flag(StatusFlag::CommunicationError, comm_error);

        // 4. Weight
        if let Some(event) = self.engine.poll_weight_changed(now_ms) {
            let occupied = event.final_weight_grams > self.config.occupancy_threshold_g;
            self.status.set_flag(StatusFlag::Occupied, occupied);
            self.pending_weight = Some(event.final_weight_grams);
            outcome.settled = Some(event);
        }
        self.status
            .set_flag(StatusFlag::ScaleError, self.engine.is_scale_faulted());
        self.flush_weight();

        // 5. Commands
        for cmd in &commands {
            self.dispatch(*cmd);
        }
        outcome.commands = commands;

        // 6. Startup phase and indicator
        if self.status.is_initializing()
            && (self.session.is_registered()
                || now_ms.saturating_sub(self.started_ms) >= u64::from(self.config.init_timeout_ms))
        {
            info!("Initialization finished");
            self.status.exit_initializing();
        }
        self.update_indicator();

        outcome.mode_changed = self.status.mode() != mode_before;
        outcome
    }

    /// Report the wireless link state.
    ///
    /// While the link is down no connection attempts are made and
    /// `CommunicationError` is raised.
    pub fn set_link_up(&mut self, up: bool) {
        if self.link_up != up {
            info!("Network link {}", if up { "up" } else { "down" });
            self.link_up = up;
        }
    }

    /// Current display mode.
    pub fn mode(&self) -> DisplayMode {
        self.status.mode()
    }

    /// Current status flags.
    pub fn status(&self) -> DeviceStatus {
        self.status.status()
    }

    /// Get the current state for logging/diagnostics
    pub fn state(&self) -> NodeState {
        NodeState {
            weight_grams: self.engine.current_weight(),
            mode: self.status.mode(),
            status: self.status.status(),
            connected: self.session.is_connected(),
            registered: self.session.is_registered(),
            calibrated: self.engine.calibration().initialized,
        }
    }

    /// Delay before the next connection attempt.
    pub fn reconnect_backoff_ms(&self) -> u32 {
        self.backoff_ms
    }

    /// The weight engine.
    pub fn engine(&self) -> &WeightEngine<L, S> {
        &self.engine
    }

    /// Mutable access to the weight engine.
    pub fn engine_mut(&mut self) -> &mut WeightEngine<L, S> {
        &mut self.engine
    }

    /// The broker session.
    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    /// Mutable access to the broker session.
    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    /// The status indicator.
    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    fn schedule_retry(&mut self, now_ms: u64) {
        self.next_attempt_ms = now_ms + u64::from(self.backoff_ms);
        info!("Next broker connect in {}ms", self.backoff_ms);
        self.backoff_ms = self
            .backoff_ms
            .saturating_mul(2)
            .min(self.config.reconnect_backoff_max_ms);
    }

    fn flush_weight(&mut self) {
        let Some(grams) = self.pending_weight else {
            return;
        };
        if !self.session.is_connected() {
            return;
        }
        match self.session.publish(PubTopic::WeightUpdate, &format_weight(grams)) {
            Ok(()) => self.pending_weight = None,
            Err(e) => warn!("Weight publish failed: {}", e),
        }
    }

    fn dispatch(&mut self, cmd: Command) {
        info!("Command: {:?}", cmd);
        match cmd {
            Command::CalcOffset => {
                self.status.set_flag(StatusFlag::CalibratingScale, true);
                if let Some(offset) = self.engine.begin_offset_calibration() {
                    self.report(PubTopic::ScaleOffset, offset);
                }
            }
            Command::CalibrateScale { grams } => {
                self.status.set_flag(StatusFlag::CalibratingScale, true);
                if let Some(factor) = self.engine.begin_factor_calibration(grams) {
                    self.report(PubTopic::ScaleFactor, factor);
                }
            }
            Command::ApplyCalibration => match self.engine.commit_calibration() {
                Ok(CalibrationCommit::Committed) => {
                    self.status.set_flag(StatusFlag::CalibratingScale, false);
                }
                Ok(CalibrationCommit::Incomplete) => {
                    self.engine.cancel_calibration();
                    self.status.set_flag(StatusFlag::CalibratingScale, false);
                }
                Err(e) => {
                    error!("Failed to save calibration: {:?}", e);
                }
            },
            Command::CancelCalibration => {
                self.engine.cancel_calibration();
                self.status.set_flag(StatusFlag::CalibratingScale, false);
            }
        }
    }

    fn report(&mut self, topic: PubTopic, value: f64) {
        if let Err(e) = self.session.publish(topic, &format_calibration(value)) {
            warn!("Calibration report failed: {}", e);
        }
    }

    fn update_indicator(&mut self) {
        let mode = self.status.mode();
        if self.shown_mode == Some(mode) {
            return;
        }
        match self.indicator.show(mode.pattern()) {
            Ok(()) => self.shown_mode = Some(mode),
            Err(e) => warn!("Status LED update failed: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, MqttConfig, NodeConfig};
    use crate::hal::{MockIndicator, MockLoadCell, MockMqtt, MockStore};

    type TestNode = MailboxNode<MockLoadCell, MockStore, MockMqtt, MockIndicator>;

    fn node_with(mqtt: MockMqtt, node: NodeConfig) -> TestNode {
        let config = Config::default()
            .with_device(DeviceConfig::default().with_id("D1"))
            .with_node(node);
        let mut cell = MockLoadCell::new();
        cell.queue_readings(&[0]);
        MailboxNode::new(cell, MockStore::new(), mqtt, MockIndicator::new(), &config, 0)
    }

    #[test]
    fn first_tick_connects_and_shows_init() {
        let mut node = node_with(MockMqtt::new(), NodeConfig::default());
        let outcome = node.tick(0);
        assert!(outcome.connect_attempted);
        assert!(node.session().is_connected());
        assert!(node.status().is_set(StatusFlag::CommunicationError));
        assert_eq!(node.indicator().shown.len(), 1);
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let mut mqtt = MockMqtt::new();
        mqtt.fail_connect = true;
        let mut node = node_with(
            mqtt,
            NodeConfig::default().with_reconnect_backoff_ms(1000, 4000),
        );

        assert!(node.tick(0).connect_attempted);
        assert!(!node.tick(999).connect_attempted);
        assert!(node.tick(1000).connect_attempted);
        // second failure waits 2s
        assert!(!node.tick(2999).connect_attempted);
        assert!(node.tick(3000).connect_attempted);
        assert!(node.tick(7000).connect_attempted);
        assert_eq!(node.reconnect_backoff_ms(), 4000);
    }

    #[test]
    fn backoff_resets_after_success() {
        let mut mqtt = MockMqtt::new();
        mqtt.fail_connect = true;
        let mut node = node_with(mqtt, NodeConfig::default());
        node.tick(0);
        node.tick(1000);
        assert_eq!(node.reconnect_backoff_ms(), 4000);

        node.session_mut().client_mut().fail_connect = false;
        node.tick(3000);
        assert!(node.session().is_connected());
        assert_eq!(node.reconnect_backoff_ms(), 1000);
    }

    #[test]
    fn link_down_blocks_reconnect() {
        let mut node = node_with(MockMqtt::new(), NodeConfig::default());
        node.set_link_up(false);
        assert!(!node.tick(0).connect_attempted);
        assert!(node.status().is_set(StatusFlag::CommunicationError));

        node.set_link_up(true);
        assert!(node.tick(50).connect_attempted);
    }

    #[test]
    fn disabled_broker_never_connects() {
        let config = Config::default()
            .with_device(DeviceConfig::default().with_id("D1"))
            .with_mqtt(MqttConfig::default().with_enabled(false));
        let mut node = MailboxNode::new(
            MockLoadCell::new(),
            MockStore::new(),
            MockMqtt::new(),
            MockIndicator::new(),
            &config,
            0,
        );

        assert!(!node.tick(0).connect_attempted);
        assert!(!node.tick(5000).connect_attempted);
        assert_eq!(node.session().client().connects, 0);
    }

    #[test]
    fn init_timeout_exits_startup() {
        let mut mqtt = MockMqtt::new();
        mqtt.fail_connect = true;
        let mut node = node_with(mqtt, NodeConfig::default().with_init_timeout_ms(500));
        node.tick(0);
        assert_eq!(node.mode(), DisplayMode::Initializing);

        node.tick(500);
        assert_eq!(node.mode(), DisplayMode::Fault);
    }

    #[test]
    fn indicator_written_only_on_change() {
        let mut node = node_with(MockMqtt::new(), NodeConfig::default());
        for t in 0..10 {
            node.tick(t * 50);
        }
        assert_eq!(node.indicator().shown.len(), 1);
    }
}
