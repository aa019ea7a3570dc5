//! # mailbox-node
//!
//! Firmware core for a mailbox sensor node: a load cell under the mailbox
//! floor, an RGB status LED, and a broker connection to a notification
//! server.
//!
//! ## Features
//!
//! - **Settle detection**: Noisy load-cell readings become one event per stable weight
//! - **Remote calibration**: Offset/factor calibration over the broker, persisted on apply
//! - **Status indication**: Independent condition flags reduced to a single LED mode
//! - **Liveness**: Retained online topic with a last will, server liveness tracking
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and network abstractions
//! - `weight` - Weight settling engine and calibration
//! - `status` - Status flags and display-mode derivation
//! - `topics` - Topic model and payload formats
//! - `session` - Broker session lifecycle
//! - `node` - Main controller that ties everything together
//! - `hal` - Concrete implementations (mock for testing, esp32 for hardware)
//!
//! ## Example
//!
//! ```rust
//! use mailbox_node::{Config, DeviceConfig, MailboxNode, StatusFlag};
//! use mailbox_node::hal::{MockIndicator, MockLoadCell, MockMqtt, MockStore};
//!
//! let config = Config::default()
//!     .with_device(DeviceConfig::from_mac(&[0x24, 0x0a, 0xc4, 0x00, 0x1b, 0xff]));
//!
//! let mut cell = MockLoadCell::new();
//! cell.queue_readings(&[0]);
//!
//! let mut node = MailboxNode::new(
//!     cell,
//!     MockStore::new(),
//!     MockMqtt::new(),
//!     MockIndicator::new(),
//!     &config,
//!     0,
//! );
//!
//! // Main loop - call tick() every loop interval (e.g., 50ms)
//! for tick in 0..200 {
//!     node.tick(tick * 50);
//! }
//!
//! // The empty scale settled and was reported
//! assert!(!node.status().is_set(StatusFlag::Occupied));
//! let weight = node.session().client().published_to("/24:0A:C4:00:1B:FF/currentWeight");
//! assert_eq!(weight[0].1, b"0.0");
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Main node controller: the periodic reconciliation loop.
pub mod node;
/// Broker session lifecycle: connect, subscribe, announce, decode.
pub mod session;
/// Device status flags and display-mode derivation.
pub mod status;
/// Topic model and payload formats for the broker protocol.
pub mod topics;
/// Core traits for hardware and network abstraction.
pub mod traits;
/// Weight settling engine and remote calibration.
pub mod weight;

/// Shared configuration system for desktop and ESP32.
pub mod config;

/// Desktop network services (feature-gated).
#[cfg(feature = "mqtt")]
pub mod services;

// Re-exports for convenience
pub use node::{MailboxNode, NodeState, TickOutcome};
pub use session::{Session, SessionError, SessionState};
pub use status::{DeviceStatus, DisplayMode, LedPattern, LedState, StatusFlag, StatusMachine};
pub use topics::{Command, DeviceTopics, PubTopic, SubTopic};
pub use traits::{
    // Hardware
    CalibrationStore,
    Clock,
    // Network
    ConnectOptions,
    LastWill,
    LoadCell,
    MqttClient,
    MqttMessage,
    StatusIndicator,
};
pub use weight::{CalibrationCommit, CalibrationState, SettleEvent, WeightEngine, WeightSample};

// Config re-exports
pub use config::{Config, DeviceConfig, MqttConfig, NodeConfig, ScaleConfig, WifiConfig};
