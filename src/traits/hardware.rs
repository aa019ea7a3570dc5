//! Hardware abstraction traits for the load cell, calibration storage, and status LED.
//!
//! This module defines the hardware interfaces that allow mailbox-node to
//! run on the ESP32 board and on desktop mocks alike.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`LoadCell`] | Raw readings from the load-cell amplifier (HX711) |
//! | [`CalibrationStore`] | Persisted offset/factor constants |
//! | [`StatusIndicator`] | RGB status LED |
//! | [`Clock`] | Time source for `no_std` environments |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For ESP32 hardware, use the
//! implementations from `hal::esp32` (requires `esp32` feature).
//!
//! # Example
//!
//! ```rust
//! use mailbox_node::traits::LoadCell;
//! use mailbox_node::hal::MockLoadCell;
//!
//! let mut cell = MockLoadCell::new();
//! cell.queue_readings(&[8_400, 8_410]);
//!
//! assert_eq!(cell.read_raw().unwrap(), 8_400);
//! assert_eq!(cell.read_raw().unwrap(), 8_410);
//! ```

use crate::status::LedPattern;
use crate::weight::CalibrationState;

/// Raw acquisition from a load-cell amplifier.
///
/// A single call returns one conversion result in ADC counts. Implementations
/// may wait briefly for the amplifier to signal data-ready, but must give up
/// after a bounded time and return an error instead of blocking forever.
pub trait LoadCell {
    /// Error type for acquisition failures.
    type Error: core::fmt::Debug;

    /// Read one raw conversion result (signed ADC counts).
    fn read_raw(&mut self) -> Result<i32, Self::Error>;
}

/// Persistent key-value storage for the scale calibration.
///
/// Backed by NVS flash on the ESP32 (`scaleValue`, `scaleOffset`,
/// `initialized` keys). Only read at startup / on cancel and written on commit.
pub trait CalibrationStore {
    /// Error type for storage operations.
    type Error: core::fmt::Debug;

    /// Load the persisted calibration.
    ///
    /// Missing keys load as their zero value with `initialized == false`.
    fn load(&mut self) -> Result<CalibrationState, Self::Error>;

    /// Persist offset, factor and the initialized flag together.
    fn save(&mut self, state: &CalibrationState) -> Result<(), Self::Error>;
}

/// Status indicator output (RGB LED).
pub trait StatusIndicator {
    /// Error type for indicator output.
    type Error: core::fmt::Debug;

    /// Drive the LEDs with the given pattern.
    fn show(&mut self, pattern: LedPattern) -> Result<(), Self::Error>;
}

/// Time source trait for `no_std` compatibility.
///
/// Provides monotonic time in milliseconds for settle timing and reconnect
/// pacing. On desktop, this can wrap `std::time::Instant`. On embedded,
/// use a hardware timer.
///
/// # Example
///
/// ```rust
/// use mailbox_node::traits::Clock;
/// use mailbox_node::hal::MockClock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(100);
/// assert_eq!(clock.now_ms(), 100);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}
