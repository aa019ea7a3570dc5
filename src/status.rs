//! Device status flags and display-mode derivation.
//!
//! The node tracks a handful of independent conditions (initializing,
//! occupied, communication error, scale error, calibrating). Exactly one
//! [`DisplayMode`] is derived from them by a fixed priority scan:
//!
//! ```text
//! Initializing > CommunicationError | ScaleError > CalibratingScale > Occupied > Idle
//! ```
//!
//! # Example
//!
//! ```rust
//! use mailbox_node::status::{DisplayMode, StatusFlag, StatusMachine};
//!
//! let mut status = StatusMachine::new();
//! assert_eq!(status.mode(), DisplayMode::Initializing);
//!
//! status.set_flag(StatusFlag::Occupied, true);
//! status.set_flag(StatusFlag::ScaleError, true);
//! assert_eq!(status.mode(), DisplayMode::Initializing);
//!
//! status.exit_initializing();
//! assert_eq!(status.mode(), DisplayMode::Fault);
//! ```

use log::info;

const FLAG_COUNT: usize = 5;

/// Independent condition flags that make up the device status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StatusFlag {
    /// Startup phase, until registration or the init timeout.
    Initializing,
    /// The last settled weight is above the occupancy threshold.
    Occupied,
    /// Broker, server or network link unavailable.
    CommunicationError,
    /// Load cell never settles.
    ScaleError,
    /// A remote calibration sequence is in progress.
    CalibratingScale,
}

impl StatusFlag {
    /// All flags, in storage order.
    pub const ALL: [StatusFlag; FLAG_COUNT] = [
        StatusFlag::Initializing,
        StatusFlag::Occupied,
        StatusFlag::CommunicationError,
        StatusFlag::ScaleError,
        StatusFlag::CalibratingScale,
    ];

    const fn index(self) -> usize {
        match self {
            StatusFlag::Initializing => 0,
            StatusFlag::Occupied => 1,
            StatusFlag::CommunicationError => 2,
            StatusFlag::ScaleError => 3,
            StatusFlag::CalibratingScale => 4,
        }
    }
}

/// Set of active status flags.
///
/// Read-only outside the [`StatusMachine`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    flags: [bool; FLAG_COUNT],
}

impl DeviceStatus {
    /// Returns true if the flag is active.
    #[inline]
    pub fn is_set(&self, flag: StatusFlag) -> bool {
        self.flags[flag.index()]
    }

    /// Returns true if a communication or scale fault is active.
    pub fn has_fault(&self) -> bool {
        self.is_set(StatusFlag::CommunicationError) || self.is_set(StatusFlag::ScaleError)
    }

    /// Derive the display mode (first match wins).
    pub fn display_mode(&self) -> DisplayMode {
        if self.is_set(StatusFlag::Initializing) {
            DisplayMode::Initializing
        } else if self.has_fault() {
            DisplayMode::Fault
        } else if self.is_set(StatusFlag::CalibratingScale) {
            DisplayMode::Calibrating
        } else if self.is_set(StatusFlag::Occupied) {
            DisplayMode::Occupied
        } else {
            DisplayMode::Idle
        }
    }

    fn set(&mut self, flag: StatusFlag, active: bool) {
        self.flags[flag.index()] = active;
    }
}

/// The single condition shown on the status indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DisplayMode {
    /// Device is starting up.
    Initializing,
    /// Communication or scale fault.
    Fault,
    /// Calibration in progress.
    Calibrating,
    /// Mail present.
    Occupied,
    /// Empty and healthy.
    Idle,
}

impl DisplayMode {
    /// LED pattern used to show this mode.
    pub const fn pattern(self) -> LedPattern {
        match self {
            DisplayMode::Initializing | DisplayMode::Calibrating => LedPattern {
                red: LedState::Off,
                green: LedState::Off,
                blue: LedState::Blink,
            },
            DisplayMode::Fault => LedPattern {
                red: LedState::Blink,
                green: LedState::Off,
                blue: LedState::Off,
            },
            DisplayMode::Occupied => LedPattern {
                red: LedState::Off,
                green: LedState::On,
                blue: LedState::Off,
            },
            DisplayMode::Idle => LedPattern::OFF,
        }
    }

    /// Returns the mode as a lowercase string.
    pub const fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Initializing => "initializing",
            DisplayMode::Fault => "fault",
            DisplayMode::Calibrating => "calibrating",
            DisplayMode::Occupied => "occupied",
            DisplayMode::Idle => "idle",
        }
    }
}

/// Output state of a single LED.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LedState {
    /// Dark.
    Off,
    /// Continuously lit.
    On,
    /// Slow blink.
    Blink,
}

/// State of the three indicator LEDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LedPattern {
    /// Red LED.
    pub red: LedState,
    /// Green LED.
    pub green: LedState,
    /// Blue LED.
    pub blue: LedState,
}

impl LedPattern {
    /// All LEDs off.
    pub const OFF: LedPattern = LedPattern {
        red: LedState::Off,
        green: LedState::Off,
        blue: LedState::Off,
    };
}

/// Owner of the [`DeviceStatus`]; the only place flags change.
#[derive(Debug)]
pub struct StatusMachine {
    status: DeviceStatus,
    mode: DisplayMode,
}

impl StatusMachine {
    /// Create a machine in the `Initializing` state.
    pub fn new() -> Self {
        let mut status = DeviceStatus::default();
        status.set(StatusFlag::Initializing, true);
        Self {
            mode: status.display_mode(),
            status,
        }
    }

    /// Set or clear a flag.
    ///
    /// Returns `true` if the flag actually changed; the display mode is only
    /// recomputed in that case.
    pub fn set_flag(&mut self, flag: StatusFlag, active: bool) -> bool {
        if self.status.is_set(flag) == active {
            return false;
        }
        self.status.set(flag, active);
        info!("Status flag {:?} -> {}", flag, active);

        let mode = self.status.display_mode();
        if mode != self.mode {
            info!("Display mode {} -> {}", self.mode.as_str(), mode.as_str());
            self.mode = mode;
        }
        true
    }

    /// Leave the startup phase.
    ///
    /// Idempotent; afterwards the mode reflects the remaining flags.
    pub fn exit_initializing(&mut self) -> bool {
        self.set_flag(StatusFlag::Initializing, false)
    }

    /// Returns true while still in the startup phase.
    pub fn is_initializing(&self) -> bool {
        self.status.is_set(StatusFlag::Initializing)
    }

    /// Current display mode.
    #[inline]
    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Snapshot of the flags.
    #[inline]
    pub fn status(&self) -> DeviceStatus {
        self.status
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_initializing() {
        let status = StatusMachine::new();
        assert!(status.is_initializing());
        assert_eq!(status.mode(), DisplayMode::Initializing);
        for flag in StatusFlag::ALL {
            assert_eq!(status.status().is_set(flag), flag == StatusFlag::Initializing);
        }
    }

    #[test]
    fn set_flag_is_idempotent() {
        let mut status = StatusMachine::new();
        assert!(status.set_flag(StatusFlag::Occupied, true));
        assert!(!status.set_flag(StatusFlag::Occupied, true));
        assert!(status.set_flag(StatusFlag::Occupied, false));
        assert!(!status.set_flag(StatusFlag::Occupied, false));
    }

    #[test]
    fn initializing_dominates_everything() {
        let mut status = StatusMachine::new();
        status.set_flag(StatusFlag::ScaleError, true);
        status.set_flag(StatusFlag::Occupied, true);
        status.set_flag(StatusFlag::CalibratingScale, true);
        assert_eq!(status.mode(), DisplayMode::Initializing);
    }

    #[test]
    fn fault_beats_occupied_after_init() {
        let mut status = StatusMachine::new();
        status.set_flag(StatusFlag::ScaleError, true);
        status.set_flag(StatusFlag::Occupied, true);

        assert!(status.exit_initializing());
        assert_eq!(status.mode(), DisplayMode::Fault);
        assert!(!status.exit_initializing());
    }

    #[test]
    fn communication_error_is_a_fault() {
        let mut status = StatusMachine::new();
        status.exit_initializing();
        status.set_flag(StatusFlag::CalibratingScale, true);
        status.set_flag(StatusFlag::CommunicationError, true);
        assert_eq!(status.mode(), DisplayMode::Fault);

        status.set_flag(StatusFlag::CommunicationError, false);
        assert_eq!(status.mode(), DisplayMode::Calibrating);
    }

    #[test]
    fn calibrating_beats_occupied() {
        let mut status = StatusMachine::new();
        status.exit_initializing();
        status.set_flag(StatusFlag::Occupied, true);
        assert_eq!(status.mode(), DisplayMode::Occupied);

        status.set_flag(StatusFlag::CalibratingScale, true);
        assert_eq!(status.mode(), DisplayMode::Calibrating);
    }

    #[test]
    fn idle_when_nothing_set() {
        let mut status = StatusMachine::new();
        status.exit_initializing();
        assert_eq!(status.mode(), DisplayMode::Idle);
        assert_eq!(status.mode().pattern(), LedPattern::OFF);
    }

    #[test]
    fn fault_pattern_blinks_red() {
        let pattern = DisplayMode::Fault.pattern();
        assert_eq!(pattern.red, LedState::Blink);
        assert_eq!(pattern.green, LedState::Off);
        assert_eq!(pattern.blue, LedState::Off);
    }
}
