//! Desktop mailbox node for testing the broker protocol without hardware.
//!
//! Runs the full node loop against a real MQTT broker with a simulated load
//! cell: every 20 seconds a letter (about 20g) drops into the box, and every
//! fourth delivery the box is emptied again. The status LED is printed
//! through the log whenever the display mode changes.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=info MQTT_HOST=localhost cargo run --example desktop_node --features mqtt
//! ```
//!
//! Watch the node from another terminal:
//!
//! ```sh
//! mosquitto_sub -v -t '/devices' -t '/+/online' -t '/+/currentWeight'
//! ```
//!
//! And drive a calibration:
//!
//! ```sh
//! mosquitto_pub -t '/DE:SK:00:00:00:01/command/CalcOffset' -m ''
//! mosquitto_pub -t '/DE:SK:00:00:00:01/command/CalibrateScale' -m '20'
//! mosquitto_pub -t '/DE:SK:00:00:00:01/command/ApplyCalibration' -m ''
//! ```

use std::convert::Infallible;
use std::env;
use std::thread;
use std::time::{Duration, Instant};

use log::info;
use mailbox_node::hal::MockStore;
use mailbox_node::services::{MqttRuntimeConfig, RumqttcClient};
use mailbox_node::{
    CalibrationState, Config, DeviceConfig, LedPattern, LoadCell, MailboxNode, MqttConfig,
    StatusIndicator,
};

/// Raw counts of the empty mailbox floor.
const EMPTY_RAW: i32 = 8_400;

/// Raw counts per gram of the simulated cell.
const COUNTS_PER_GRAM: f64 = 420.0;

/// Time between simulated deliveries.
const DELIVERY_INTERVAL: Duration = Duration::from_secs(20);

// ============================================================================
// Simulated hardware
// ============================================================================

/// Load cell that receives a letter every [`DELIVERY_INTERVAL`].
struct SimulatedLoadCell {
    started: Instant,
    jitter: u32,
}

impl SimulatedLoadCell {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            jitter: 0,
        }
    }

    fn letters(&self) -> u64 {
        let deliveries = self.started.elapsed().as_secs() / DELIVERY_INTERVAL.as_secs();
        deliveries % 4
    }
}

impl LoadCell for SimulatedLoadCell {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<i32, Infallible> {
        // Cheap deterministic noise of a few counts
        self.jitter = self.jitter.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let noise = (self.jitter >> 16) as i32 % 40 - 20;
        let grams = self.letters() as f64 * 20.0;
        Ok(EMPTY_RAW + (grams * COUNTS_PER_GRAM) as i32 + noise)
    }
}

/// Status LED that logs its colours.
struct LogIndicator;

impl StatusIndicator for LogIndicator {
    type Error = Infallible;

    fn show(&mut self, pattern: LedPattern) -> Result<(), Infallible> {
        info!(
            "LED red={:?} green={:?} blue={:?}",
            pattern.red, pattern.green, pattern.blue
        );
        Ok(())
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let host = env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_string());
    let mut mqtt = MqttConfig::default().with_host(&host);
    if let (Ok(user), Ok(password)) = (env::var("MQTT_USER"), env::var("MQTT_PASSWORD")) {
        mqtt = mqtt.with_auth(&user, &password);
    }

    let config = Config::default()
        .with_mqtt(mqtt)
        .with_device(DeviceConfig::default().with_id("DE:SK:00:00:00:01"));

    // Start with the simulated cell already calibrated
    let store = MockStore::with_state(CalibrationState {
        offset_raw: EMPTY_RAW,
        scale_factor: 1.0 / COUNTS_PER_GRAM,
        initialized: true,
    });

    let client = RumqttcClient::new(MqttRuntimeConfig::from_config(&config.mqtt));
    let started = Instant::now();
    let now_ms = || started.elapsed().as_millis() as u64;

    let mut node = MailboxNode::new(
        SimulatedLoadCell::new(),
        store,
        client,
        LogIndicator,
        &config,
        now_ms(),
    );

    info!("=================================");
    info!("  mailbox-node desktop");
    info!("=================================");
    info!("Broker: {}:{}", config.mqtt.host, config.mqtt.port);
    info!("Device: {}", config.device.id);

    let interval = Duration::from_millis(u64::from(config.node.loop_interval_ms));
    loop {
        let outcome = node.tick(now_ms());
        if let Some(event) = outcome.settled {
            info!(
                "Settled at {:.1}g ({})",
                event.final_weight_grams,
                node.mode().as_str()
            );
        }
        if outcome.mode_changed {
            info!("Mode: {}", node.mode().as_str());
        }
        thread::sleep(interval);
    }
}
