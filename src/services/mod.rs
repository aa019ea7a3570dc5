//! Desktop network services.
//!
//! - `mqtt` feature: `rumqttc`-based [`MqttClient`](crate::traits::MqttClient)
//!   transport, so the node runs unchanged against a real broker on a PC
//!
//! ```ignore
//! use mailbox_node::services::{MqttRuntimeConfig, RumqttcClient};
//!
//! let client = RumqttcClient::new(MqttRuntimeConfig::from_config(&config.mqtt));
//! let node = MailboxNode::new(cell, store, client, led, &config, 0);
//! ```

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::*;
