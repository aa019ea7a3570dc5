//! ESP32 hardware abstraction layer for the mailbox sensor node.
//!
//! This module provides hardware implementations for an ESP32 DevKit board
//! with a load cell under the mailbox floor and an RGB status LED.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32 (Xtensa dual core, 4MB Flash)
//! - **Load cell amplifier**: HX711 (24-bit, channel A, gain 128)
//! - **Status LED**: common-cathode RGB, red/blue on LEDC for blinking
//! - **Storage**: NVS namespace for the calibration constants
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for GPIO assignments.

mod clock;
mod hx711;
mod led;
mod nvs;

pub use clock::Esp32Clock;
pub use hx711::{Hx711, Hx711Error};
pub use led::Esp32StatusLed;
pub use nvs::{Esp32CalibrationStore, NVS_NAMESPACE};

#[cfg(feature = "wifi")]
mod wifi;
#[cfg(feature = "wifi")]
pub use wifi::Esp32Wifi;

#[cfg(feature = "esp32-mqtt")]
mod mqtt;
#[cfg(feature = "esp32-mqtt")]
pub use mqtt::{Esp32Mqtt, Esp32MqttError};

/// Pin assignments for the ESP32 DevKit wiring.
pub mod pins {
    // =========================================================================
    // Load Cell (HX711)
    // =========================================================================

    /// HX711 DOUT (data ready / serial data)
    pub const SCALE_DATA: i32 = 32;

    /// HX711 PD_SCK (serial clock, held high = power down)
    pub const SCALE_CLOCK: i32 = 33;

    // =========================================================================
    // Status LED
    // =========================================================================

    /// Red LED (LEDC channel 1, blinks on fault)
    pub const LED_RED: i32 = 0;

    /// Green LED (LEDC channel 2, on while occupied)
    pub const LED_GREEN: i32 = 2;

    /// Blue LED (LEDC channel 0, blinks while starting or calibrating)
    pub const LED_BLUE: i32 = 15;
}
