//! Weight settling engine and remote calibration.
//!
//! The [`WeightEngine`] turns noisy raw load-cell readings into a current
//! weight and discrete [`SettleEvent`]s, one per stable plateau.
//!
//! # Settle Detection
//!
//! The engine keeps a reference weight `W`, a hop counter `H` and the time `T`
//! of the last significant change. Each poll reads a new weight:
//!
//! - Deviation larger than the threshold (coarse while `H == 0`, fine once
//!   `H > 0`): `W` takes the new value, `T` restarts, `H` increments
//!   (saturating at `max_hops`).
//! - No deviation for `wait_time_ms` since `T`: one event with `W` is
//!   emitted and `H` returns to zero.
//!
//! A load cell that never settles drives `H` to `max_hops`, which is the only
//! fault signal ([`WeightEngine::is_scale_faulted`]).
//!
//! # Calibration
//!
//! Calibration results are applied to the live conversion immediately,
//! persisted only by [`WeightEngine::commit_calibration`] and reverted by
//! [`WeightEngine::cancel_calibration`].
//!
//! # Example
//!
//! ```rust
//! use mailbox_node::config::ScaleConfig;
//! use mailbox_node::hal::{MockLoadCell, MockStore};
//! use mailbox_node::weight::WeightEngine;
//!
//! let mut cell = MockLoadCell::new();
//! cell.queue_readings(&[0]);
//!
//! let config = ScaleConfig::default().with_wait_time_ms(1000);
//! let mut engine = WeightEngine::new(cell, MockStore::new(), config, 0);
//!
//! assert!(engine.poll_weight_changed(500).is_none());
//! let event = engine.poll_weight_changed(1000).unwrap();
//! assert_eq!(event.final_weight_grams, 0.0);
//! ```

use log::{debug, info, warn};

use crate::config::ScaleConfig;
use crate::traits::{CalibrationStore, LoadCell};

/// Persisted scale calibration constants.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationState {
    /// Raw reading with no load present.
    pub offset_raw: i32,
    /// Grams per raw count.
    pub scale_factor: f64,
    /// True once a complete calibration has been committed.
    pub initialized: bool,
}

impl CalibrationState {
    /// Calibration with both constants set and marked initialized.
    pub fn calibrated(offset_raw: i32, scale_factor: f64) -> Self {
        Self {
            offset_raw,
            scale_factor,
            initialized: true,
        }
    }

    /// Both constants are non-zero, so the state may be committed.
    pub fn is_complete(&self) -> bool {
        self.offset_raw != 0 && self.scale_factor != 0.0
    }

    /// Convert an averaged raw reading into grams.
    ///
    /// A zero factor (nothing calibrated yet) converts with factor 1.
    pub fn to_grams(&self, raw: f64) -> f64 {
        let factor = if self.scale_factor == 0.0 {
            1.0
        } else {
            self.scale_factor
        };
        (raw - self.offset_raw as f64) * factor
    }
}

/// One averaged acquisition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightSample {
    /// Mean raw reading (ADC counts).
    pub raw_value: f64,
    /// Acquisition time.
    pub timestamp_ms: u64,
}

/// The weight of a newly settled plateau.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SettleEvent {
    /// Settled weight in grams.
    pub final_weight_grams: f64,
}

/// Result of [`WeightEngine::commit_calibration`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationCommit {
    /// Offset and factor were persisted together with `initialized`.
    Committed,
    /// Offset or factor is zero; nothing was written.
    Incomplete,
}

/// Settle detection and calibration over a [`LoadCell`].
///
/// Owns the load cell, the calibration store and the live calibration.
/// Time is always passed in by the caller, so the engine is fully
/// deterministic under test.
pub struct WeightEngine<L: LoadCell, S: CalibrationStore> {
    load_cell: L,
    store: S,
    config: ScaleConfig,
    calibration: CalibrationState,
    weight: f64,
    hops: u32,
    last_change_ms: u64,
    reported: bool,
}

impl<L: LoadCell, S: CalibrationStore> WeightEngine<L, S> {
    /// Create an engine and load the persisted calibration.
    ///
    /// A store that fails to load leaves the engine uncalibrated. The first
    /// plateau (including an empty scale) is reported `wait_time_ms` after
    /// `now_ms`.
    pub fn new(load_cell: L, mut store: S, config: ScaleConfig, now_ms: u64) -> Self {
        let calibration = match store.load() {
            Ok(state) if state.initialized => {
                info!(
                    "Loaded calibration: offset {} factor {}",
                    state.offset_raw, state.scale_factor
                );
                state
            }
            Ok(_) => {
                info!("Scale not calibrated yet, start a remote calibration");
                CalibrationState::default()
            }
            Err(e) => {
                warn!("Failed to load calibration: {:?}", e);
                CalibrationState::default()
            }
        };

        Self {
            load_cell,
            store,
            config,
            calibration,
            weight: 0.0,
            hops: 0,
            last_change_ms: now_ms,
            reported: false,
        }
    }

    /// Average `read_samples` raw readings.
    ///
    /// Failed reads are skipped; returns `None` if every read failed.
    pub fn sample(&mut self, now_ms: u64) -> Option<WeightSample> {
        let count = self.config.read_samples;
        self.mean_raw(count).map(|raw_value| WeightSample {
            raw_value,
            timestamp_ms: now_ms,
        })
    }

    /// Sample the scale and run settle detection.
    ///
    /// Returns an event exactly once per plateau.
    pub fn poll_weight_changed(&mut self, now_ms: u64) -> Option<SettleEvent> {
        match self.sample(now_ms) {
            Some(sample) => {
                let grams = self.calibration.to_grams(sample.raw_value);
                let threshold = if self.hops == 0 {
                    self.config.coarse_threshold_g
                } else {
                    self.config.fine_threshold_g
                };

                if grams > self.weight + threshold || grams < self.weight - threshold {
                    debug!("Weight change detected: {:.1}g", grams);
                    self.weight = grams;
                    self.mark_change(now_ms);
                }
            }
            None => {
                // No quiet time while the cell is unreadable
                self.mark_change(now_ms);
            }
        }

        let quiet_ms = now_ms.saturating_sub(self.last_change_ms);
        if !self.reported && quiet_ms >= u64::from(self.config.wait_time_ms) {
            self.hops = 0;
            self.reported = true;
            info!("Final weight: {:.1}g", self.weight);
            return Some(SettleEvent {
                final_weight_grams: self.weight,
            });
        }
        None
    }

    /// True when the hop budget is exhausted without settling.
    pub fn is_scale_faulted(&self) -> bool {
        self.hops >= self.config.max_hops
    }

    /// Current reference weight in grams.
    pub fn current_weight(&self) -> f64 {
        self.weight
    }

    /// Current hop count.
    pub fn hops(&self) -> u32 {
        self.hops
    }

    /// Live calibration (including uncommitted results).
    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    /// Record the unloaded mean as the candidate offset.
    ///
    /// Applied immediately, not persisted. Returns the new offset, or `None`
    /// if the load cell produced no readings.
    pub fn begin_offset_calibration(&mut self) -> Option<f64> {
        let count = self.config.calibration_samples;
        let Some(mean) = self.mean_raw(count) else {
            warn!("Offset calibration failed: no readings");
            return None;
        };

        self.calibration.offset_raw = round_to_i32(mean);
        info!("Scale offset: {}", self.calibration.offset_raw);
        Some(self.calibration.offset_raw as f64)
    }

    /// Derive the candidate factor from a known reference weight.
    ///
    /// `factor = known_grams / (mean - offset)`, or 0 when that is undefined
    /// (zero grams or no difference from the offset). Applied immediately,
    /// not persisted.
    pub fn begin_factor_calibration(&mut self, known_grams: u32) -> Option<f64> {
        let count = self.config.calibration_samples;
        let Some(mean) = self.mean_raw(count) else {
            warn!("Factor calibration failed: no readings");
            return None;
        };

        let delta = mean - self.calibration.offset_raw as f64;
        let factor = if known_grams == 0 || delta == 0.0 {
            warn!(
                "Factor calibration with {}g is undefined (delta {:.1})",
                known_grams, delta
            );
            0.0
        } else {
            f64::from(known_grams) / delta
        };

        self.calibration.scale_factor = factor;
        info!("Scale factor: {}", factor);
        Some(factor)
    }

    /// Persist the live calibration if it is complete.
    ///
    /// Offset, factor and `initialized` are written in a single store call;
    /// an incomplete calibration writes nothing.
    pub fn commit_calibration(&mut self) -> Result<CalibrationCommit, S::Error> {
        if !self.calibration.is_complete() {
            warn!(
                "Calibration incomplete (offset {}, factor {}), not saved",
                self.calibration.offset_raw, self.calibration.scale_factor
            );
            return Ok(CalibrationCommit::Incomplete);
        }

        let state = CalibrationState::calibrated(
            self.calibration.offset_raw,
            self.calibration.scale_factor,
        );
        self.store.save(&state)?;
        self.calibration = state;
        info!(
            "Calibration saved: offset {} factor {}",
            state.offset_raw, state.scale_factor
        );
        Ok(CalibrationCommit::Committed)
    }

    /// Drop uncommitted results and go back to the persisted calibration.
    pub fn cancel_calibration(&mut self) {
        self.calibration = match self.store.load() {
            Ok(state) if state.initialized => state,
            Ok(_) => CalibrationState::default(),
            Err(e) => {
                warn!("Failed to reload calibration: {:?}", e);
                CalibrationState::default()
            }
        };
        info!(
            "Calibration cancelled: offset {} factor {}",
            self.calibration.offset_raw, self.calibration.scale_factor
        );
    }

    /// Access the load cell.
    pub fn load_cell_mut(&mut self) -> &mut L {
        &mut self.load_cell
    }

    /// Access the calibration store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn mark_change(&mut self, now_ms: u64) {
        self.last_change_ms = now_ms;
        self.reported = false;
        if self.hops < self.config.max_hops {
            self.hops += 1;
        }
    }

    fn mean_raw(&mut self, count: u8) -> Option<f64> {
        let mut sum = 0i64;
        let mut ok = 0u32;
        for _ in 0..count.max(1) {
            match self.load_cell.read_raw() {
                Ok(raw) => {
                    sum += i64::from(raw);
                    ok += 1;
                }
                Err(e) => warn!("Load cell read failed: {:?}", e),
            }
        }
        if ok == 0 {
            None
        } else {
            Some(sum as f64 / f64::from(ok))
        }
    }
}

fn round_to_i32(value: f64) -> i32 {
    if value >= 0.0 {
        (value + 0.5) as i32
    } else {
        (value - 0.5) as i32
    }
}
