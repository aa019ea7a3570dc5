//! Trait definitions for hardware abstraction and networking.
//!
//! This module defines the core abstractions that allow mailbox-node to:
//! - Run on different hardware (ESP32, desktop mock)
//! - Use different MQTT transports (esp-idf-svc, rumqttc, mock)
//!
//! # Submodules
//!
//! - `hardware`: Load cell, calibration storage, status indicator, clock
//! - `network`: MQTT client trait with last-will connect options
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`LoadCell`]: Raw ADC counts from the load-cell amplifier
//! - [`CalibrationStore`]: Persisted offset/factor constants
//! - [`StatusIndicator`]: RGB status LED
//! - [`Clock`]: Time source for `no_std` environments

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;
