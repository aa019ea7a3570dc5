//! Shared configuration system for desktop and ESP32.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! # Example
//!
//! ```rust
//! use mailbox_node::config::{Config, MqttConfig, ScaleConfig};
//!
//! // Use defaults
//! let config = Config::default();
//!
//! // Or customize
//! let config = Config::default()
//!     .with_mqtt(MqttConfig::default().with_host("10.42.0.1"))
//!     .with_scale(ScaleConfig::default().with_wait_time_ms(3000));
//! ```

use core::fmt::Write;

use heapless::String as HString;

/// Maximum length for short config strings (hostnames, credentials, identities)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Lowest reconnect delay the node will ever use.
pub const MIN_RECONNECT_BACKOFF_MS: u32 = 1000;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let _ = hs.push_str(truncate_utf8(s, MAX_SHORT_STRING));
    hs
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    let take = s.len().min(max);
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= take)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    &s[..valid_end]
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// WiFi connection configuration
    pub wifi: WifiConfig,
    /// MQTT client configuration
    pub mqtt: MqttConfig,
    /// Weight engine configuration
    pub scale: ScaleConfig,
    /// Control loop configuration
    pub node: NodeConfig,
    /// Device identification
    pub device: DeviceConfig,
}

impl Config {
    /// Set WiFi configuration
    pub fn with_wifi(mut self, wifi: WifiConfig) -> Self {
        self.wifi = wifi;
        self
    }

    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set weight engine configuration
    pub fn with_scale(mut self, scale: ScaleConfig) -> Self {
        self.scale = scale;
        self
    }

    /// Set control loop configuration
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.node = node;
        self
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub host: ShortString,
    /// Broker port
    pub port: u16,
    /// Username for authentication (empty = no auth)
    pub username: ShortString,
    /// Password for authentication
    pub password: ShortString,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Whether MQTT is enabled
    pub enabled: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: short_string("10.42.0.1"),
            port: 1883,
            username: ShortString::new(),
            password: ShortString::new(),
            keep_alive_secs: 15,
            enabled: true,
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = short_string(username);
        self.password = short_string(password);
        self
    }

    /// Set the keep-alive interval
    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Enable or disable MQTT
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

// ============================================================================
// Scale Config
// ============================================================================

/// Weight engine configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleConfig {
    /// Deviation (grams) that counts as a change while the scale is at rest
    pub coarse_threshold_g: f64,
    /// Deviation (grams) that counts as a change once the scale is moving
    pub fine_threshold_g: f64,
    /// Quiet period (ms) after the last change before a weight is reported
    pub wait_time_ms: u32,
    /// Changes without settling before the load cell is considered faulty
    pub max_hops: u32,
    /// Raw samples averaged per weight reading
    pub read_samples: u8,
    /// Raw samples averaged per calibration step
    pub calibration_samples: u8,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            coarse_threshold_g: 5.0,
            fine_threshold_g: 1.0,
            wait_time_ms: 5000,
            max_hops: 20,
            read_samples: 10,
            calibration_samples: 20,
        }
    }
}

impl ScaleConfig {
    /// Set both deviation thresholds
    pub fn with_thresholds(mut self, coarse_g: f64, fine_g: f64) -> Self {
        self.coarse_threshold_g = coarse_g;
        self.fine_threshold_g = fine_g;
        self
    }

    /// Set the settle wait time
    pub fn with_wait_time_ms(mut self, ms: u32) -> Self {
        self.wait_time_ms = ms;
        self
    }

    /// Set the hop budget before a scale fault
    pub fn with_max_hops(mut self, hops: u32) -> Self {
        self.max_hops = hops.max(1);
        self
    }

    /// Set the number of samples averaged per reading
    pub fn with_read_samples(mut self, samples: u8) -> Self {
        self.read_samples = samples.max(1);
        self
    }

    /// Set the number of samples averaged per calibration step
    pub fn with_calibration_samples(mut self, samples: u8) -> Self {
        self.calibration_samples = samples.max(1);
        self
    }
}

// ============================================================================
// Node Config
// ============================================================================

/// Control loop configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeConfig {
    /// Settled weight (grams) above which the mailbox counts as occupied
    pub occupancy_threshold_g: f64,
    /// Longest time the startup indication is shown without registration
    pub init_timeout_ms: u32,
    /// First reconnect delay
    pub reconnect_backoff_ms: u32,
    /// Upper bound for the doubling reconnect delay
    pub reconnect_backoff_max_ms: u32,
    /// Time a connection attempt may take before it counts as failed
    pub connect_timeout_ms: u32,
    /// Main loop interval in milliseconds
    pub loop_interval_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            occupancy_threshold_g: 1.0,
            init_timeout_ms: 30_000,
            reconnect_backoff_ms: MIN_RECONNECT_BACKOFF_MS,
            reconnect_backoff_max_ms: 30_000,
            connect_timeout_ms: 10_000,
            loop_interval_ms: 50,
        }
    }
}

impl NodeConfig {
    /// Set the occupancy threshold
    pub fn with_occupancy_threshold_g(mut self, grams: f64) -> Self {
        self.occupancy_threshold_g = grams;
        self
    }

    /// Set the startup timeout
    pub fn with_init_timeout_ms(mut self, ms: u32) -> Self {
        self.init_timeout_ms = ms;
        self
    }

    /// Set the reconnect backoff range (the minimum is never below one second)
    pub fn with_reconnect_backoff_ms(mut self, min_ms: u32, max_ms: u32) -> Self {
        self.reconnect_backoff_ms = min_ms.max(MIN_RECONNECT_BACKOFF_MS);
        self.reconnect_backoff_max_ms = max_ms.max(self.reconnect_backoff_ms);
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout_ms(mut self, ms: u32) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set the loop interval
    pub fn with_loop_interval_ms(mut self, ms: u32) -> Self {
        self.loop_interval_ms = ms;
        self
    }
}

// ============================================================================
// WiFi Config
// ============================================================================

/// WiFi connection configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WifiConfig {
    /// WiFi network SSID
    pub ssid: ShortString,
    /// WiFi password
    pub password: ShortString,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: ShortString::new(),
            password: ShortString::new(),
            connect_timeout_ms: 30_000,
        }
    }
}

impl WifiConfig {
    /// Set the SSID
    pub fn with_ssid(mut self, ssid: &str) -> Self {
        self.ssid = short_string(ssid);
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = short_string(password);
        self
    }

    /// Check if WiFi credentials are configured
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device identification configuration
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Device identity; every device topic is derived from it.
    pub id: ShortString,
}

impl DeviceConfig {
    /// Use an explicit identity
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = short_string(id);
        self
    }

    /// Derive the identity from a hardware address (`AA:BB:CC:DD:EE:FF`)
    pub fn from_mac(mac: &[u8; 6]) -> Self {
        let mut id = ShortString::new();
        for (i, byte) in mac.iter().enumerate() {
            if i > 0 {
                let _ = id.push(':');
            }
            let _ = write!(id, "{:02X}", byte);
        }
        Self { id }
    }

    /// Check if an identity has been assigned
    pub fn is_configured(&self) -> bool {
        !self.id.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
