//! HX711 load-cell amplifier driver (bit-banged).
//!
//! The HX711 pulls DOUT low when a conversion is ready. 24 clock pulses on
//! PD_SCK shift the result out MSB first; extra pulses select the gain for
//! the next conversion (1 = channel A, gain 128).
//!
//! # Wiring
//!
//! - DOUT → GPIO32
//! - PD_SCK → GPIO33
//! - VCC → 3.3V
//! - GND → GND

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::traits::LoadCell;

/// Data bits per conversion.
const DATA_BITS: u32 = 24;

/// Gain pulses after the data bits (channel A, gain 128).
const GAIN_PULSES: u32 = 1;

/// Clock half period in microseconds.
const CLK_HALF_PERIOD_US: u32 = 1;

/// Data-ready poll interval.
const READY_POLL_US: u32 = 100;

/// Longest wait for data-ready (one conversion at 10 SPS plus margin).
const READY_TIMEOUT_US: u32 = 150_000;

/// Errors from the HX711 driver.
#[derive(Debug)]
pub enum Hx711Error<ClkE, DataE> {
    /// Driving PD_SCK failed.
    Clock(ClkE),
    /// Reading DOUT failed.
    Data(DataE),
    /// DOUT never signalled data-ready (amplifier missing or powered down).
    NotReady,
}

/// HX711 driver over embedded-hal pins and delay.
///
/// # Example
///
/// ```ignore
/// use esp_idf_hal::delay::Ets;
/// use esp_idf_hal::gpio::PinDriver;
///
/// let clock = PinDriver::output(peripherals.pins.gpio33)?;
/// let data = PinDriver::input(peripherals.pins.gpio32)?;
/// let mut hx711 = Hx711::new(clock, data, Ets);
/// let raw = hx711.read_raw()?;
/// ```
pub struct Hx711<CLK, DATA, D> {
    clock: CLK,
    data: DATA,
    delay: D,
}

impl<CLK, DATA, D> Hx711<CLK, DATA, D>
where
    CLK: OutputPin,
    DATA: InputPin,
    D: DelayNs,
{
    /// Creates the driver. The amplifier powers up once PD_SCK is low.
    pub fn new(clock: CLK, data: DATA, delay: D) -> Self {
        Self { clock, data, delay }
    }

    /// Power the amplifier down (PD_SCK high for more than 60µs).
    pub fn power_down(&mut self) -> Result<(), Hx711Error<CLK::Error, DATA::Error>> {
        self.clock.set_high().map_err(Hx711Error::Clock)?;
        self.delay.delay_us(100);
        Ok(())
    }

    /// Power the amplifier up.
    pub fn power_up(&mut self) -> Result<(), Hx711Error<CLK::Error, DATA::Error>> {
        self.clock.set_low().map_err(Hx711Error::Clock)
    }

    fn wait_ready(&mut self) -> Result<(), Hx711Error<CLK::Error, DATA::Error>> {
        let mut waited = 0;
        while self.data.is_high().map_err(Hx711Error::Data)? {
            if waited >= READY_TIMEOUT_US {
                return Err(Hx711Error::NotReady);
            }
            self.delay.delay_us(READY_POLL_US);
            waited += READY_POLL_US;
        }
        Ok(())
    }

    fn pulse(&mut self) -> Result<(), Hx711Error<CLK::Error, DATA::Error>> {
        self.clock.set_high().map_err(Hx711Error::Clock)?;
        self.delay.delay_us(CLK_HALF_PERIOD_US);
        self.clock.set_low().map_err(Hx711Error::Clock)?;
        self.delay.delay_us(CLK_HALF_PERIOD_US);
        Ok(())
    }
}

impl<CLK, DATA, D> LoadCell for Hx711<CLK, DATA, D>
where
    CLK: OutputPin,
    DATA: InputPin,
    D: DelayNs,
{
    type Error = Hx711Error<CLK::Error, DATA::Error>;

    fn read_raw(&mut self) -> Result<i32, Self::Error> {
        self.power_up()?;
        self.wait_ready()?;

        let mut value: u32 = 0;
        for _ in 0..DATA_BITS {
            self.pulse()?;
            value <<= 1;
            if self.data.is_high().map_err(Hx711Error::Data)? {
                value |= 1;
            }
        }
        for _ in 0..GAIN_PULSES {
            self.pulse()?;
        }

        Ok(sign_extend_24(value))
    }
}

/// Two's complement 24-bit to i32.
fn sign_extend_24(value: u32) -> i32 {
    ((value << 8) as i32) >> 8
}
