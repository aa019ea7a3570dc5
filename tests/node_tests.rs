//! Integration tests for the node controller against the mock broker

use mailbox_node::hal::{MockIndicator, MockLoadCell, MockMqtt, MockStore};
use mailbox_node::{
    CalibrationState, Command, Config, DeviceConfig, DisplayMode, MailboxNode, StatusFlag,
};

const ID: &str = "AA:BB:CC:DD:EE:FF";

type TestNode = MailboxNode<MockLoadCell, MockStore, MockMqtt, MockIndicator>;

fn node_with_store(store: MockStore, raw: i32) -> TestNode {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = Config::default().with_device(DeviceConfig::default().with_id(ID));
    let mut cell = MockLoadCell::new();
    cell.hold(raw);
    MailboxNode::new(cell, store, MockMqtt::new(), MockIndicator::new(), &config, 0)
}

fn node() -> TestNode {
    node_with_store(MockStore::new(), 0)
}

fn topic(suffix: &str) -> String {
    format!("/{}/{}", ID, suffix)
}

/// Deliver one message and run a tick.
fn deliver(node: &mut TestNode, topic: &str, payload: &str, now_ms: u64) -> Vec<Command> {
    node.session_mut()
        .client_mut()
        .queue_message(topic, payload.as_bytes().to_vec());
    node.tick(now_ms).commands
}

/// Connect and acknowledge the registration.
fn registered_node(store: MockStore, raw: i32) -> TestNode {
    let mut node = node_with_store(store, raw);
    node.tick(0);
    deliver(&mut node, &format!("/{}", ID), "", 50);
    assert!(node.session().is_registered());
    node
}

fn payloads(node: &TestNode, topic: &str) -> Vec<String> {
    node.session()
        .client()
        .published_to(topic)
        .into_iter()
        .map(|(_, payload, _)| String::from_utf8_lossy(payload).into_owned())
        .collect()
}

// ============================================================================
// Session Lifecycle
// ============================================================================

#[test]
fn connect_subscribes_and_announces() {
    let mut node = node();
    assert!(node.tick(0).connect_attempted);

    let mqtt = node.session().client();
    for suffix in [
        "command/CalcOffset",
        "command/CalibrateScale",
        "command/ApplyCalibration",
        "command/CancelCalibration",
    ] {
        assert!(mqtt.is_subscribed(&topic(suffix)));
    }
    assert!(mqtt.is_subscribed(&format!("/{}", ID)));
    assert!(mqtt.is_subscribed("/server/online"));

    let online = mqtt.published_to(&topic("online"));
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].1, b"connected");
    assert!(online[0].2);

    assert_eq!(payloads(&node, "/devices"), vec![ID.to_string()]);

    let will = &mqtt.last_connect.as_ref().unwrap().last_will;
    assert_eq!(will.topic, topic("online"));
    assert_eq!(will.payload, b"disconnected");
    assert!(will.retain);
}

#[test]
fn reconnect_registers_once_per_connection() {
    let mut node = node();
    node.tick(0);

    node.session_mut().client_mut().drop_connection();
    let outcome = node.tick(100);
    assert!(!outcome.connect_attempted);
    assert!(!node.session().is_connected());
    assert!(node.status().is_set(StatusFlag::CommunicationError));

    // Backoff of 1s from the failure
    assert!(!node.tick(1050).connect_attempted);
    assert!(node.tick(1100).connect_attempted);
    assert!(node.session().is_connected());
    assert_eq!(node.reconnect_backoff_ms(), 1000);

    let mqtt = node.session().client();
    assert_eq!(mqtt.connects, 2);
    assert_eq!(mqtt.published_to("/devices").len(), 2);
    assert!(mqtt
        .published_to(&topic("online"))
        .iter()
        .all(|(_, payload, retain)| payload == b"connected" && *retain));
}

#[test]
fn failed_registration_is_retried() {
    let mut node = node();
    node.session_mut().client_mut().reject_next_publish_to = Some("/devices".into());

    assert!(node.tick(0).connect_attempted);
    assert!(!node.session().is_connected());
    assert!(payloads(&node, "/devices").is_empty());
    assert!(node.status().is_set(StatusFlag::CommunicationError));

    // Retried after the backoff
    assert!(!node.tick(500).connect_attempted);
    assert!(node.tick(1000).connect_attempted);
    assert!(node.session().is_connected());
    assert_eq!(node.session().client().connects, 2);
    assert_eq!(payloads(&node, "/devices"), vec![ID.to_string()]);

    deliver(&mut node, &format!("/{}", ID), "", 1050);
    assert!(node.session().is_registered());
    assert!(!node.status().is_set(StatusFlag::CommunicationError));
}

#[test]
fn failed_reregistration_reconnects() {
    let mut node = registered_node(MockStore::new(), 0);
    deliver(&mut node, "/server/online", "disconnected", 100);

    node.session_mut().client_mut().reject_next_publish_to = Some("/devices".into());
    deliver(&mut node, "/server/online", "connected", 150);
    assert!(!node.session().is_connected());
    assert_eq!(payloads(&node, "/devices").len(), 1);

    assert!(node.tick(1150).connect_attempted);
    assert_eq!(payloads(&node, "/devices").len(), 2);
}

#[test]
fn link_down_blocks_connection_attempts() {
    let mut node = node();
    node.set_link_up(false);

    assert!(!node.tick(0).connect_attempted);
    assert!(!node.tick(5000).connect_attempted);
    assert_eq!(node.session().client().connects, 0);
    assert!(node.status().is_set(StatusFlag::CommunicationError));

    node.set_link_up(true);
    assert!(node.tick(5050).connect_attempted);
}

#[test]
fn server_restart_reregisters() {
    let mut node = registered_node(MockStore::new(), 0);
    assert!(!node.status().is_set(StatusFlag::CommunicationError));

    deliver(&mut node, "/server/online", "disconnected", 100);
    assert_eq!(node.session().server_online(), Some(false));
    assert!(node.status().is_set(StatusFlag::CommunicationError));

    deliver(&mut node, "/server/online", "connected", 150);
    assert_eq!(payloads(&node, "/devices").len(), 2);
    // Still waiting for the acknowledgement
    assert!(node.status().is_set(StatusFlag::CommunicationError));

    deliver(&mut node, &format!("/{}", ID), "", 200);
    assert!(!node.status().is_set(StatusFlag::CommunicationError));
}

#[test]
fn retained_server_online_does_not_reregister() {
    let mut node = node();
    node.tick(0);

    deliver(&mut node, "/server/online", "connected", 50);
    assert_eq!(node.session().server_online(), Some(true));
    assert_eq!(payloads(&node, "/devices").len(), 1);
}

// ============================================================================
// Weight Reporting
// ============================================================================

#[test]
fn settled_weight_is_published_retained() {
    let mut node = registered_node(MockStore::new(), 0);

    for t in (100..=5000).step_by(50) {
        node.tick(t);
    }
    node.engine_mut().load_cell_mut().hold(30);
    for t in (5050..=11_000).step_by(50) {
        node.tick(t);
    }

    assert_eq!(payloads(&node, &topic("currentWeight")), vec!["0.0", "30.0"]);
    let mqtt = node.session().client();
    assert!(mqtt.published_to(&topic("currentWeight")).iter().all(|m| m.2));
    assert!(node.status().is_set(StatusFlag::Occupied));
    assert_eq!(node.mode(), DisplayMode::Occupied);
}

#[test]
fn weight_is_republished_after_failed_publish() {
    let mut node = registered_node(MockStore::new(), 0);
    node.session_mut().client_mut().fail_publish = true;

    let settled = (100..=5000)
        .step_by(50)
        .filter_map(|t| node.tick(t).settled)
        .count();
    assert_eq!(settled, 1);
    assert!(payloads(&node, &topic("currentWeight")).is_empty());

    node.session_mut().client_mut().fail_publish = false;
    node.tick(5050);
    assert_eq!(payloads(&node, &topic("currentWeight")), vec!["0.0"]);

    node.tick(5100);
    assert_eq!(payloads(&node, &topic("currentWeight")).len(), 1);
}

// ============================================================================
// Remote Calibration
// ============================================================================

#[test]
fn calibration_sequence_persists_on_apply() {
    let mut node = registered_node(MockStore::new(), 8400);

    let commands = deliver(&mut node, &topic("command/CalcOffset"), "", 100);
    assert_eq!(commands, vec![Command::CalcOffset]);
    assert_eq!(
        payloads(&node, &topic("calibration/scaleOffset")),
        vec!["8400.00"]
    );
    assert_eq!(node.mode(), DisplayMode::Calibrating);

    node.engine_mut().load_cell_mut().hold(8650);
    let commands = deliver(&mut node, &topic("command/CalibrateScale"), "250", 150);
    assert_eq!(commands, vec![Command::CalibrateScale { grams: 250 }]);
    assert_eq!(
        payloads(&node, &topic("calibration/scaleValue")),
        vec!["1.00"]
    );
    assert_eq!(node.engine().store().saves, 0);

    deliver(&mut node, &topic("command/ApplyCalibration"), "", 200);
    assert_eq!(node.engine().store().saves, 1);
    assert_eq!(
        node.engine().store().state,
        CalibrationState::calibrated(8400, 1.0)
    );
    assert!(!node.status().is_set(StatusFlag::CalibratingScale));
    assert!(node.state().calibrated);
}

#[test]
fn invalid_reference_weight_is_ignored() {
    let mut node = registered_node(MockStore::new(), 8400);

    let commands = deliver(&mut node, &topic("command/CalibrateScale"), "heavy", 100);
    assert!(commands.is_empty());
    assert!(payloads(&node, &topic("calibration/scaleValue")).is_empty());
    assert!(!node.status().is_set(StatusFlag::CalibratingScale));
}

#[test]
fn incomplete_apply_reverts() {
    let persisted = CalibrationState::calibrated(1000, 0.5);
    let mut node = registered_node(MockStore::with_state(persisted), 0);

    // An offset of zero can never be committed
    deliver(&mut node, &topic("command/CalcOffset"), "", 100);
    assert_eq!(node.engine().calibration().offset_raw, 0);

    deliver(&mut node, &topic("command/ApplyCalibration"), "", 150);
    assert_eq!(node.engine().store().saves, 0);
    assert_eq!(*node.engine().calibration(), persisted);
    assert!(!node.status().is_set(StatusFlag::CalibratingScale));
}

#[test]
fn cancel_reverts_without_saving() {
    let persisted = CalibrationState::calibrated(1000, 0.5);
    let mut node = registered_node(MockStore::with_state(persisted), 3000);

    deliver(&mut node, &topic("command/CalibrateScale"), "100", 100);
    assert_eq!(node.engine().calibration().scale_factor, 0.05);
    assert_eq!(node.mode(), DisplayMode::Calibrating);

    deliver(&mut node, &topic("command/CancelCalibration"), "", 150);
    assert_eq!(*node.engine().calibration(), persisted);
    assert_eq!(node.engine().store().saves, 0);
    assert_eq!(node.mode(), DisplayMode::Idle);
}

#[test]
fn failed_save_keeps_calibrating() {
    let mut store = MockStore::new();
    store.fail_save = true;
    let mut node = registered_node(store, 8400);

    deliver(&mut node, &topic("command/CalcOffset"), "", 100);
    node.engine_mut().load_cell_mut().hold(8500);
    deliver(&mut node, &topic("command/CalibrateScale"), "10", 150);
    deliver(&mut node, &topic("command/ApplyCalibration"), "", 200);

    assert!(node.status().is_set(StatusFlag::CalibratingScale));
    assert!(!node.engine().store().state.initialized);
}

// ============================================================================
// Status Display
// ============================================================================

#[test]
fn initializing_until_registered() {
    let mut node = node();
    node.tick(0);
    assert_eq!(node.mode(), DisplayMode::Initializing);
    assert_eq!(
        node.indicator().current(),
        Some(DisplayMode::Initializing.pattern())
    );

    deliver(&mut node, &format!("/{}", ID), "", 50);
    assert_eq!(node.mode(), DisplayMode::Idle);
    assert_eq!(node.indicator().current(), Some(DisplayMode::Idle.pattern()));
}

#[test]
fn init_timeout_without_server() {
    let mut node = node();
    let mut mode_changes = 0;
    for t in (0..30_000).step_by(50) {
        if node.tick(t).mode_changed {
            mode_changes += 1;
        }
    }
    assert_eq!(mode_changes, 0);
    assert_eq!(node.mode(), DisplayMode::Initializing);

    assert!(node.tick(30_000).mode_changed);
    // Never registered, so the fault shows
    assert_eq!(node.mode(), DisplayMode::Fault);
}

#[test]
fn fault_outranks_calibration() {
    let mut node = registered_node(MockStore::new(), 8400);

    deliver(&mut node, &topic("command/CalcOffset"), "", 100);
    assert_eq!(node.mode(), DisplayMode::Calibrating);

    deliver(&mut node, "/server/online", "disconnected", 150);
    assert_eq!(node.mode(), DisplayMode::Fault);
    assert_eq!(node.indicator().current(), Some(DisplayMode::Fault.pattern()));
}

#[test]
fn indicator_written_only_on_mode_change() {
    let mut node = registered_node(MockStore::new(), 0);
    let shown = node.indicator().shown.len();

    for t in (100..2000).step_by(50) {
        node.tick(t);
    }
    assert_eq!(node.indicator().shown.len(), shown);
}
