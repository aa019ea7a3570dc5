//! Integration tests for settle detection and calibration

use mailbox_node::hal::{MockLoadCell, MockStore};
use mailbox_node::{CalibrationCommit, CalibrationState, ScaleConfig, WeightEngine};

type Engine = WeightEngine<MockLoadCell, MockStore>;

const STEP_MS: u64 = 50;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine_with(store: MockStore, raw: i32) -> Engine {
    init_logger();
    let mut cell = MockLoadCell::new();
    cell.hold(raw);
    WeightEngine::new(cell, store, ScaleConfig::default(), 0)
}

/// Poll every `STEP_MS` in `[from, to)` and collect the settled weights.
fn run(engine: &mut Engine, from: u64, to: u64) -> Vec<f64> {
    (from..to)
        .step_by(STEP_MS as usize)
        .filter_map(|t| engine.poll_weight_changed(t))
        .map(|event| event.final_weight_grams)
        .collect()
}

// ============================================================================
// Settle Detection
// ============================================================================

#[test]
fn empty_scale_reported_after_wait() {
    let mut engine = engine_with(MockStore::new(), 0);

    assert!(run(&mut engine, 0, 5000).is_empty());
    assert_eq!(engine.poll_weight_changed(5000).map(|e| e.final_weight_grams), Some(0.0));
}

#[test]
fn one_event_per_plateau() {
    let mut engine = engine_with(MockStore::new(), 0);

    let mut events = run(&mut engine, 0, 6000);
    engine.load_cell_mut().hold(50);
    events.extend(run(&mut engine, 6000, 30_000));

    assert_eq!(events, vec![0.0, 50.0]);
}

#[test]
fn noise_inside_threshold_never_reports() {
    // 0.1 g per count around an offset of 1000
    let store = MockStore::with_state(CalibrationState::calibrated(1000, 0.1));
    let mut engine = engine_with(store, 1000);

    assert_eq!(run(&mut engine, 0, 5050), vec![0.0]);

    // +-0.9 g jitter for a minute
    let mut events = Vec::new();
    for (i, t) in (5050..65_050).step_by(STEP_MS as usize).enumerate() {
        let raw = if i % 2 == 0 { 1009 } else { 991 };
        engine.load_cell_mut().hold(raw);
        events.extend(engine.poll_weight_changed(t));
    }

    assert!(events.is_empty());
    assert_eq!(engine.hops(), 0);
}

#[test]
fn calibrated_weight_is_converted() {
    let store = MockStore::with_state(CalibrationState::calibrated(8400, 0.5));
    let mut engine = engine_with(store, 8600);

    assert_eq!(run(&mut engine, 0, 5050), vec![100.0]);
}

// ============================================================================
// Scale Fault
// ============================================================================

#[test]
fn oscillation_saturates_hops_then_recovers() {
    let mut engine = engine_with(MockStore::new(), 0);

    let mut events = Vec::new();
    for (i, t) in (0..2000).step_by(STEP_MS as usize).enumerate() {
        let raw = if i % 2 == 0 { 0 } else { 100 };
        engine.load_cell_mut().hold(raw);
        events.extend(engine.poll_weight_changed(t).map(|e| e.final_weight_grams));
    }

    assert!(events.is_empty());
    assert_eq!(engine.hops(), 20);
    assert!(engine.is_scale_faulted());

    // Load stays put; the plateau settles and clears the fault
    engine.load_cell_mut().hold(100);
    let events = run(&mut engine, 2000, 10_000);

    assert_eq!(events, vec![100.0]);
    assert_eq!(engine.hops(), 0);
    assert!(!engine.is_scale_faulted());
}

#[test]
fn unreadable_cell_restarts_quiet_time() {
    let mut engine = engine_with(MockStore::new(), 0);

    assert!(run(&mut engine, 0, 4000).is_empty());

    engine.load_cell_mut().fail = true;
    assert!(engine.poll_weight_changed(4000).is_none());
    assert_eq!(engine.hops(), 1);
    engine.load_cell_mut().fail = false;

    assert!(run(&mut engine, 4050, 9000).is_empty());
    assert_eq!(engine.poll_weight_changed(9000).map(|e| e.final_weight_grams), Some(0.0));
}

// ============================================================================
// Calibration
// ============================================================================

#[test]
fn full_calibration_is_persisted_once() {
    let mut engine = engine_with(MockStore::new(), 8400);

    assert_eq!(engine.begin_offset_calibration(), Some(8400.0));

    engine.load_cell_mut().hold(12_400);
    let factor = engine.begin_factor_calibration(200).unwrap();
    assert!((factor - 0.05).abs() < 1e-9);
    assert_eq!(engine.store().saves, 0);

    assert_eq!(engine.commit_calibration(), Ok(CalibrationCommit::Committed));
    assert_eq!(engine.store().saves, 1);
    assert_eq!(engine.store().state, CalibrationState::calibrated(8400, factor));

    // The new constants are live right away
    let events = run(&mut engine, 0, 5050);
    assert_eq!(events.len(), 1);
    assert!((events[0] - 200.0).abs() < 1e-6);
}

#[test]
fn zero_factor_is_never_persisted() {
    let mut engine = engine_with(MockStore::new(), 8400);

    engine.begin_offset_calibration();
    // Reference weight equal to the offset reading
    assert_eq!(engine.begin_factor_calibration(100), Some(0.0));

    assert_eq!(engine.commit_calibration(), Ok(CalibrationCommit::Incomplete));
    assert_eq!(engine.store().saves, 0);
    assert!(!engine.store().state.initialized);
}

#[test]
fn zero_grams_reference_gives_zero_factor() {
    let mut engine = engine_with(MockStore::new(), 8400);

    engine.begin_offset_calibration();
    engine.load_cell_mut().hold(9400);
    assert_eq!(engine.begin_factor_calibration(0), Some(0.0));
}

#[test]
fn cancel_restores_persisted_calibration() {
    let persisted = CalibrationState::calibrated(1000, 0.5);
    let mut engine = engine_with(MockStore::with_state(persisted), 3000);

    engine.begin_offset_calibration();
    engine.begin_factor_calibration(100);
    assert_eq!(engine.calibration().offset_raw, 3000);

    engine.cancel_calibration();
    assert_eq!(*engine.calibration(), persisted);
    assert_eq!(engine.store().saves, 0);
}

#[test]
fn failed_save_reports_error() {
    let mut store = MockStore::new();
    store.fail_save = true;
    let mut engine = engine_with(store, 8400);

    engine.begin_offset_calibration();
    engine.load_cell_mut().hold(8500);
    engine.begin_factor_calibration(10);

    assert!(engine.commit_calibration().is_err());
    assert!(!engine.store().state.initialized);
}

#[test]
fn failed_save_keeps_previous_calibration() {
    let persisted = CalibrationState::calibrated(1000, 0.5);
    let mut store = MockStore::with_state(persisted);
    store.fail_save = true;
    let mut engine = engine_with(store, 3000);

    engine.begin_offset_calibration();
    engine.load_cell_mut().hold(3100);
    engine.begin_factor_calibration(10);

    assert!(engine.commit_calibration().is_err());
    assert_eq!(engine.store().state, persisted);

    // The rejected constants stay uncommitted
    engine.cancel_calibration();
    assert_eq!(*engine.calibration(), persisted);
}
