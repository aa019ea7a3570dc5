//! WiFi station management for the ESP32.
//!
//! The first association happens during construction (blocking, bounded by
//! the ESP-IDF connect timeout). After that the link is only observed:
//! [`Esp32Wifi::is_connected`] feeds the node's link state and
//! [`Esp32Wifi::reconnect`] starts a new association without waiting.
//!
//! # Example
//!
//! ```ignore
//! use mailbox_node::hal::esp32::Esp32Wifi;
//! use mailbox_node::config::WifiConfig;
//!
//! let config = WifiConfig::default()
//!     .with_ssid("Mailbox-Wifi")
//!     .with_password("secret123");
//!
//! let wifi = Esp32Wifi::new(modem, sysloop, Some(nvs), &config)?;
//! let device = DeviceConfig::from_mac(&wifi.mac()?);
//! ```

use std::net::Ipv4Addr;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use crate::config::WifiConfig;

/// WiFi station connection.
pub struct Esp32Wifi<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> Esp32Wifi<'a> {
    /// Configure station mode and try to associate once.
    ///
    /// A failed first association is logged, not returned: the node starts
    /// with the link down and retries from its loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the WiFi driver cannot be initialized or started.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        config: &WifiConfig,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        let mut ssid: heapless::String<32> = heapless::String::new();
        let _ = ssid.push_str(config.ssid.as_str());
        let mut password: heapless::String<64> = heapless::String::new();
        let _ = password.push_str(config.password.as_str());

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid,
            password,
            ..Default::default()
        }))?;
        wifi.start()?;

        info!("WiFi connecting to '{}'", config.ssid);
        match wifi.connect().and_then(|_| wifi.wait_netif_up()) {
            Ok(()) => {
                if let Ok(ip_info) = wifi.wifi().sta_netif().get_ip_info() {
                    info!("WiFi connected, IP {}", ip_info.ip);
                }
            }
            Err(e) => warn!("WiFi connect failed: {:?}", e),
        }

        Ok(Self { wifi })
    }

    /// Station hardware address; the device identity is derived from it.
    pub fn mac(&self) -> anyhow::Result<[u8; 6]> {
        Ok(self.wifi.wifi().sta_netif().get_mac()?)
    }

    /// Get the current IP address, if connected.
    pub fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }

    /// Check if WiFi is associated and has an address.
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }

    /// Start a new association without waiting for it.
    pub fn reconnect(&mut self) {
        info!("WiFi reconnecting");
        if let Err(e) = self.wifi.wifi_mut().connect() {
            warn!("WiFi reconnect failed: {:?}", e);
        }
    }
}
