//! RGB status LED driven by the LEDC peripheral.
//!
//! All three colours share one 1Hz LEDC timer with 12-bit resolution, so a
//! short duty gives a slow blink without any work in the main loop:
//!
//! - Off: duty 0
//! - On: full duty
//! - Blink: [`Esp32StatusLed::BLINK_DUTY`] (one short flash per second)

use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use esp_idf_hal::sys::EspError;

use crate::status::{LedPattern, LedState};
use crate::traits::StatusIndicator;

/// RGB status LED on three LEDC channels.
///
/// # Example
///
/// ```ignore
/// use mailbox_node::hal::esp32::Esp32StatusLed;
/// use mailbox_node::DisplayMode;
/// use mailbox_node::traits::StatusIndicator;
///
/// let mut led = Esp32StatusLed::new(
///     peripherals.ledc.timer0,
///     peripherals.ledc.channel1, peripherals.pins.gpio0,  // red
///     peripherals.ledc.channel2, peripherals.pins.gpio2,  // green
///     peripherals.ledc.channel0, peripherals.pins.gpio15, // blue
/// )?;
/// led.show(DisplayMode::Initializing.pattern())?;
/// ```
pub struct Esp32StatusLed<'d> {
    red: LedcDriver<'d>,
    green: LedcDriver<'d>,
    blue: LedcDriver<'d>,
}

impl<'d> Esp32StatusLed<'d> {
    /// LEDC frequency; one period is one blink.
    const FREQ_HZ: u32 = 1;

    /// LEDC resolution (12-bit = 4096 steps)
    const RESOLUTION: Resolution = Resolution::Bits12;

    /// Duty of a blinking LED (about 25ms lit per second).
    pub const BLINK_DUTY: u32 = 100;

    /// Creates the LED driver with every colour off.
    ///
    /// # Errors
    ///
    /// Returns an error if LEDC initialization fails.
    #[allow(clippy::too_many_arguments)]
    pub fn new<T, TI, RC, RCI, RP, RPI, GC, GCI, GP, GPI, BC, BCI, BP, BPI>(
        timer: T,
        red_channel: RC,
        red_pin: RP,
        green_channel: GC,
        green_pin: GP,
        blue_channel: BC,
        blue_pin: BP,
    ) -> Result<Self, EspError>
    where
        TI: esp_idf_hal::ledc::LedcTimer + 'd,
        T: Peripheral<P = TI> + 'd,
        RCI: esp_idf_hal::ledc::LedcChannel<SpeedMode = TI::SpeedMode> + 'd,
        RC: Peripheral<P = RCI> + 'd,
        GCI: esp_idf_hal::ledc::LedcChannel<SpeedMode = TI::SpeedMode> + 'd,
        GC: Peripheral<P = GCI> + 'd,
        BCI: esp_idf_hal::ledc::LedcChannel<SpeedMode = TI::SpeedMode> + 'd,
        BC: Peripheral<P = BCI> + 'd,
        RPI: esp_idf_hal::gpio::OutputPin + 'd,
        RP: Peripheral<P = RPI> + 'd,
        GPI: esp_idf_hal::gpio::OutputPin + 'd,
        GP: Peripheral<P = GPI> + 'd,
        BPI: esp_idf_hal::gpio::OutputPin + 'd,
        BP: Peripheral<P = BPI> + 'd,
    {
        let timer_config = TimerConfig::default()
            .frequency(Self::FREQ_HZ.Hz())
            .resolution(Self::RESOLUTION);
        let timer_driver = LedcTimerDriver::new(timer, &timer_config)?;

        let mut led = Self {
            red: LedcDriver::new(red_channel, &timer_driver, red_pin)?,
            green: LedcDriver::new(green_channel, &timer_driver, green_pin)?,
            blue: LedcDriver::new(blue_channel, &timer_driver, blue_pin)?,
        };
        led.show(LedPattern::OFF)?;
        Ok(led)
    }
}

fn apply(channel: &mut LedcDriver<'_>, state: LedState) -> Result<(), EspError> {
    let duty = match state {
        LedState::Off => 0,
        LedState::On => channel.get_max_duty(),
        LedState::Blink => Esp32StatusLed::BLINK_DUTY,
    };
    channel.set_duty(duty)
}

impl StatusIndicator for Esp32StatusLed<'_> {
    type Error = EspError;

    fn show(&mut self, pattern: LedPattern) -> Result<(), EspError> {
        apply(&mut self.red, pattern.red)?;
        apply(&mut self.green, pattern.green)?;
        apply(&mut self.blue, pattern.blue)
    }
}
