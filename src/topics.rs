//! Topic model for the broker protocol.
//!
//! Every per-device topic is derived from the device identity `D` (its
//! hardware address). Inbound topics are matched exactly; anything else
//! decodes to [`SubTopic::Undefined`].
//!
//! # Example
//!
//! ```rust
//! use mailbox_node::topics::{Command, DeviceTopics, PubTopic, SubTopic};
//!
//! let topics = DeviceTopics::new("AA:BB:CC:DD:EE:FF");
//!
//! let sub = topics.decode("/AA:BB:CC:DD:EE:FF/command/CalibrateScale");
//! assert_eq!(sub, SubTopic::CalibrateScale);
//! assert_eq!(Command::parse(sub, b"250"), Some(Command::CalibrateScale { grams: 250 }));
//!
//! // Registration always announces the identity
//! let (topic, payload) = topics.encode(PubTopic::RegisterDevice, b"ignored");
//! assert_eq!(topic, "/devices");
//! assert_eq!(payload, b"AA:BB:CC:DD:EE:FF");
//! ```

extern crate alloc;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use log::warn;

/// Topic the device announces itself on.
pub const REGISTER_TOPIC: &str = "/devices";

/// Topic carrying the server's liveness.
pub const SERVER_ONLINE_TOPIC: &str = "/server/online";

/// Payload published to the online topic once connected.
pub const ONLINE_PAYLOAD: &str = "connected";

/// Last-will payload of the online topic.
pub const OFFLINE_PAYLOAD: &str = "disconnected";

/// Inbound message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubTopic {
    /// `/server/online`
    ServerOnline,
    /// `/D`: the server acknowledged the registration.
    DeviceRegistered,
    /// `/D/command/CalcOffset`
    CalcOffset,
    /// `/D/command/CalibrateScale`
    CalibrateScale,
    /// `/D/command/ApplyCalibration`
    ApplyCalibration,
    /// `/D/command/CancelCalibration`
    CancelCalibration,
    /// Any topic not in the set above.
    Undefined,
}

impl SubTopic {
    /// Topics the device subscribes to.
    pub const SUBSCRIBED: [SubTopic; 6] = [
        SubTopic::ServerOnline,
        SubTopic::DeviceRegistered,
        SubTopic::CalcOffset,
        SubTopic::CalibrateScale,
        SubTopic::ApplyCalibration,
        SubTopic::CancelCalibration,
    ];
}

/// Outbound message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PubTopic {
    /// `/D/calibration/scaleOffset`
    ScaleOffset,
    /// `/D/calibration/scaleValue`
    ScaleFactor,
    /// `/D/currentWeight`
    WeightUpdate,
    /// `/devices`
    RegisterDevice,
}

impl PubTopic {
    /// Whether the broker retains messages of this kind.
    pub const fn retained(self) -> bool {
        matches!(self, PubTopic::WeightUpdate)
    }
}

/// Calibration commands addressed to this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Measure the unloaded offset.
    CalcOffset,
    /// Derive the factor from a known weight.
    CalibrateScale {
        /// Reference weight on the scale.
        grams: u32,
    },
    /// Persist the calibration.
    ApplyCalibration,
    /// Revert to the persisted calibration.
    CancelCalibration,
}

impl Command {
    /// Build a command from a decoded topic and its payload.
    ///
    /// Returns `None` for non-command topics and for a `CalibrateScale`
    /// payload that is not an unsigned integer.
    pub fn parse(topic: SubTopic, payload: &[u8]) -> Option<Self> {
        match topic {
            SubTopic::CalcOffset => Some(Command::CalcOffset),
            SubTopic::CalibrateScale => match parse_grams(payload) {
                Some(grams) => Some(Command::CalibrateScale { grams }),
                None => {
                    warn!("Invalid CalibrateScale payload: {:?}", payload);
                    None
                }
            },
            SubTopic::ApplyCalibration => Some(Command::ApplyCalibration),
            SubTopic::CancelCalibration => Some(Command::CancelCalibration),
            SubTopic::ServerOnline | SubTopic::DeviceRegistered | SubTopic::Undefined => None,
        }
    }
}

fn parse_grams(payload: &[u8]) -> Option<u32> {
    core::str::from_utf8(payload).ok()?.trim().parse().ok()
}

/// Topic strings derived from one device identity.
#[derive(Clone, Debug)]
pub struct DeviceTopics {
    id: String,
    registered: String,
    online: String,
    weight: String,
    scale_offset: String,
    scale_factor: String,
    calc_offset: String,
    calibrate_scale: String,
    apply_calibration: String,
    cancel_calibration: String,
}

impl DeviceTopics {
    /// Derive all topics for identity `id`.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            registered: format!("/{}", id),
            online: format!("/{}/online", id),
            weight: format!("/{}/currentWeight", id),
            scale_offset: format!("/{}/calibration/scaleOffset", id),
            scale_factor: format!("/{}/calibration/scaleValue", id),
            calc_offset: format!("/{}/command/CalcOffset", id),
            calibrate_scale: format!("/{}/command/CalibrateScale", id),
            apply_calibration: format!("/{}/command/ApplyCalibration", id),
            cancel_calibration: format!("/{}/command/CancelCalibration", id),
        }
    }

    /// The device identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Online/last-will topic.
    pub fn online(&self) -> &str {
        &self.online
    }

    /// Topic string of an inbound kind.
    pub fn sub_topic(&self, topic: SubTopic) -> &str {
        match topic {
            SubTopic::ServerOnline => SERVER_ONLINE_TOPIC,
            SubTopic::DeviceRegistered => &self.registered,
            SubTopic::CalcOffset => &self.calc_offset,
            SubTopic::CalibrateScale => &self.calibrate_scale,
            SubTopic::ApplyCalibration => &self.apply_calibration,
            SubTopic::CancelCalibration => &self.cancel_calibration,
            SubTopic::Undefined => "",
        }
    }

    /// Topic string of an outbound kind.
    pub fn pub_topic(&self, topic: PubTopic) -> &str {
        match topic {
            PubTopic::ScaleOffset => &self.scale_offset,
            PubTopic::ScaleFactor => &self.scale_factor,
            PubTopic::WeightUpdate => &self.weight,
            PubTopic::RegisterDevice => REGISTER_TOPIC,
        }
    }

    /// Exact-match an inbound topic string.
    pub fn decode(&self, topic: &str) -> SubTopic {
        SubTopic::SUBSCRIBED
            .into_iter()
            .find(|sub| self.sub_topic(*sub) == topic)
            .unwrap_or(SubTopic::Undefined)
    }

    /// Topic and payload for an outbound message.
    ///
    /// `RegisterDevice` always carries the identity, whatever was passed.
    pub fn encode<'a>(&'a self, topic: PubTopic, payload: &'a [u8]) -> (&'a str, &'a [u8]) {
        let payload = match topic {
            PubTopic::RegisterDevice => self.id.as_bytes(),
            _ => payload,
        };
        (self.pub_topic(topic), payload)
    }
}

/// Weight payload, one fractional digit.
pub fn format_weight(grams: f64) -> Vec<u8> {
    format!("{:.1}", grams).into_bytes()
}

/// Calibration payload, two fractional digits.
///
/// Factors below 0.005 g/count print as `0.00`; the value is only a report,
/// the engine keeps full precision.
pub fn format_calibration(value: f64) -> Vec<u8> {
    format!("{:.2}", value).into_bytes()
}
