//! Calibration storage in the NVS flash partition.
//!
//! | Key | Type | Content |
//! |-----|------|---------|
//! | `scaleValue` | u64 | factor as `f64` bits |
//! | `scaleOffset` | i32 | offset in raw counts |
//! | `initialized` | u8 | 1 once a complete calibration was saved |
//!
//! `initialized` is cleared before the constants are written and set last,
//! so a reset in the middle of a save never loads half a calibration. When a
//! write fails, the previous three values are written back so an earlier
//! calibration stays loadable.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::EspError;
use log::{debug, warn};

use crate::traits::CalibrationStore;
use crate::weight::CalibrationState;

/// NVS namespace holding the calibration keys.
pub const NVS_NAMESPACE: &str = "mailbox";

const KEY_FACTOR: &str = "scaleValue";
const KEY_OFFSET: &str = "scaleOffset";
const KEY_INITIALIZED: &str = "initialized";

/// [`CalibrationStore`] backed by ESP-IDF NVS.
pub struct Esp32CalibrationStore {
    nvs: EspNvs<NvsDefault>,
}

impl Esp32CalibrationStore {
    /// Open the calibration namespace read/write.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, EspError> {
        Ok(Self {
            nvs: EspNvs::new(partition, NVS_NAMESPACE, true)?,
        })
    }
}

impl CalibrationStore for Esp32CalibrationStore {
    type Error = EspError;

    fn load(&mut self) -> Result<CalibrationState, EspError> {
        let initialized = self.nvs.get_u8(KEY_INITIALIZED)?.unwrap_or(0) == 1;
        let offset_raw = self.nvs.get_i32(KEY_OFFSET)?.unwrap_or(0);
        let scale_factor = self.nvs.get_u64(KEY_FACTOR)?.map(f64::from_bits).unwrap_or(0.0);
        debug!(
            "NVS calibration: offset {} factor {} initialized {}",
            offset_raw, scale_factor, initialized
        );
        Ok(CalibrationState {
            offset_raw,
            scale_factor,
            initialized,
        })
    }

    fn save(&mut self, state: &CalibrationState) -> Result<(), EspError> {
        let previous = self.load()?;
        if let Err(e) = self.write(state) {
            warn!("NVS calibration write failed, restoring previous values");
            if self.write(&previous).is_err() {
                warn!("NVS calibration restore failed");
            }
            return Err(e);
        }
        Ok(())
    }
}

impl Esp32CalibrationStore {
    fn write(&mut self, state: &CalibrationState) -> Result<(), EspError> {
        self.nvs.set_u8(KEY_INITIALIZED, 0)?;
        self.nvs.set_u64(KEY_FACTOR, state.scale_factor.to_bits())?;
        self.nvs.set_i32(KEY_OFFSET, state.offset_raw)?;
        self.nvs.set_u8(KEY_INITIALIZED, u8::from(state.initialized))?;
        Ok(())
    }
}
