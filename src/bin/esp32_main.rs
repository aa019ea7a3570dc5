//! ESP32 mailbox sensor node firmware.
//!
//! This is the main entry point for the physical device. It runs a 20Hz
//! loop that:
//! - Tracks the WiFi link and reassociates when it drops
//! - Services the broker session (connect, subscribe, announce, commands)
//! - Samples the HX711 and reports settled weights
//! - Shows the device status on the RGB LED
//!
//! # Configuration
//!
//! Credentials are compile-time environment variables:
//!
//! ```bash
//! WIFI_SSID=... WIFI_PASSWORD=... MQTT_HOST=10.42.0.1 \
//! MQTT_USER=... MQTT_PASSWORD=... \
//! cargo build --release --features esp32-mqtt --bin esp32_main
//! ```

use std::thread;
use std::time::Duration;

use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};
use mailbox_node::hal::esp32::{
    pins, Esp32CalibrationStore, Esp32Clock, Esp32Mqtt, Esp32StatusLed, Esp32Wifi, Hx711,
};
use mailbox_node::traits::Clock;
use mailbox_node::{Config, DeviceConfig, MailboxNode, MqttConfig, WifiConfig};

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_hal::sys::link_patches();
    EspLogger::initialize_default();

    info!("mailbox-node {}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Configuration
    // =========================================================================
    let mut config = Config::default()
        .with_wifi(
            WifiConfig::default()
                .with_ssid(option_env!("WIFI_SSID").unwrap_or(""))
                .with_password(option_env!("WIFI_PASSWORD").unwrap_or("")),
        )
        .with_mqtt(
            MqttConfig::default()
                .with_host(option_env!("MQTT_HOST").unwrap_or("10.42.0.1"))
                .with_auth(
                    option_env!("MQTT_USER").unwrap_or(""),
                    option_env!("MQTT_PASSWORD").unwrap_or(""),
                ),
        );

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // =========================================================================
    // Status LED (RGB on GPIO0/2/15)
    // =========================================================================
    let led = Esp32StatusLed::new(
        peripherals.ledc.timer0,
        peripherals.ledc.channel1,
        peripherals.pins.gpio0,
        peripherals.ledc.channel2,
        peripherals.pins.gpio2,
        peripherals.ledc.channel0,
        peripherals.pins.gpio15,
    )?;
    info!(
        "Status LED initialized (R GPIO{}, G GPIO{}, B GPIO{})",
        pins::LED_RED,
        pins::LED_GREEN,
        pins::LED_BLUE
    );

    // =========================================================================
    // Load cell (HX711 on GPIO32/33)
    // =========================================================================
    let hx711 = Hx711::new(
        PinDriver::output(peripherals.pins.gpio33)?,
        PinDriver::input(peripherals.pins.gpio32)?,
        Ets,
    );
    info!(
        "HX711 initialized (GPIO{} data, GPIO{} clock)",
        pins::SCALE_DATA,
        pins::SCALE_CLOCK
    );

    // =========================================================================
    // Calibration storage (NVS)
    // =========================================================================
    let store = Esp32CalibrationStore::new(nvs.clone())?;

    // =========================================================================
    // WiFi + device identity
    // =========================================================================
    if !config.wifi.is_configured() {
        warn!("WiFi not configured (set WIFI_SSID/WIFI_PASSWORD)");
    }
    let mut wifi = Esp32Wifi::new(peripherals.modem, sysloop, Some(nvs), &config.wifi)?;
    config.device = DeviceConfig::from_mac(&wifi.mac()?);
    info!("Device identity {}", config.device.id);

    // =========================================================================
    // Node
    // =========================================================================
    let mqtt = Esp32Mqtt::new(&config.mqtt);
    let clock = Esp32Clock::new();
    let mut node = MailboxNode::new(hx711, store, mqtt, led, &config, clock.now_ms());

    let loop_interval = Duration::from_millis(u64::from(config.node.loop_interval_ms));
    let wifi_retry_ms = u64::from(config.wifi.connect_timeout_ms);
    let mut link_down_since: Option<u64> = None;

    info!("Starting main loop ({}ms)", config.node.loop_interval_ms);

    // =========================================================================
    // Main Loop
    // =========================================================================
    loop {
        let now = clock.now_ms();

        let link_up = wifi.is_connected();
        node.set_link_up(link_up);
        if link_up {
            link_down_since = None;
        } else {
            let since = *link_down_since.get_or_insert(now);
            if now.saturating_sub(since) >= wifi_retry_ms {
                wifi.reconnect();
                link_down_since = Some(now);
            }
        }

        let outcome = node.tick(now);
        if let Some(event) = outcome.settled {
            info!(
                "Settled at {:.1}g, mode {}",
                event.final_weight_grams,
                node.mode().as_str()
            );
        }

        // Sleep until next tick
        thread::sleep(loop_interval);
    }
}
