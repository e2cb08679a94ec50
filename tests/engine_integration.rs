//! End-to-end tests driving the engine through its public API.

mod common;

use nilm_engine::devices::{DeviceState, SignatureCatalog};
use nilm_engine::error::InputError;
use nilm_engine::nilm::{
    AccuracyTally, DisaggregationEngine, EngineSettings, LatestSink, PowerSample, RunReport,
};

#[test]
fn fridge_cycle_reports_on_off_and_runtime() {
    let mut engine = common::recording_engine(common::fridge_catalog());

    let mut states = Vec::new();
    for (sec, watts) in [(0, 5.0), (1, 60.0), (2, 60.0), (3, 5.0)] {
        engine.process(&common::sample(sec, watts)).unwrap();
        states.push(engine.tracker("refrigerator").unwrap().state());
    }

    assert_eq!(
        states,
        vec![
            DeviceState::Off,
            DeviceState::On,
            DeviceState::On,
            DeviceState::Off
        ]
    );
    let published: Vec<bool> = engine
        .sink()
        .for_device("refrigerator")
        .map(|s| s.is_on)
        .collect();
    assert_eq!(published, vec![false, true, true, false]);

    let third = &engine.sink().snapshots()[2];
    assert!((third.cumulative_runtime_seconds - 2.0).abs() < 1e-9);
    assert_eq!(engine.tracker("refrigerator").unwrap().activations(), 1);
}

#[test]
fn day_boundary_keeps_only_post_midnight_energy() {
    let mut engine = common::recording_engine(common::fridge_catalog());
    engine
        .process(&PowerSample::new(common::at(1, 23, 59, 59), 60.0))
        .unwrap();
    engine
        .process(&PowerSample::new(common::at(2, 0, 0, 1), 60.0))
        .unwrap();

    let fridge = engine.tracker("refrigerator").unwrap();
    let expected = 60.0 * 1.0 / 3_600_000.0;
    assert!((fridge.daily_energy_kwh() - expected).abs() < 1e-12);
    assert_eq!(fridge.cumulative_runtime().as_secs(), 2);
    assert_eq!(
        fridge.last_reset_date(),
        Some(common::at(2, 0, 0, 1).date_naive())
    );
}

#[test]
fn clock_regression_does_not_accrue() {
    let mut engine = common::recording_engine(common::fridge_catalog());
    engine.process(&common::sample(10, 60.0)).unwrap();
    engine.process(&common::sample(20, 60.0)).unwrap();
    let before = engine.tracker("refrigerator").unwrap().daily_energy_kwh();

    engine.process(&common::sample(5, 60.0)).unwrap();

    let fridge = engine.tracker("refrigerator").unwrap();
    assert_eq!(fridge.daily_energy_kwh(), before);
    assert_eq!(fridge.cumulative_runtime().as_secs(), 10);
    assert!(fridge.state().is_on());
}

#[test]
fn rejected_readings_leave_every_tracker_untouched() {
    let mut engine = DisaggregationEngine::new(
        SignatureCatalog::builtin(),
        EngineSettings::default(),
        LatestSink::new(),
    )
    .unwrap();
    engine.process(&common::sample(0, 2000.0)).unwrap();
    let before = engine.snapshots();

    let err = engine.process_raw("unknown", common::at(1, 10, 0, 1)).unwrap_err();
    assert!(matches!(err, InputError::NotNumeric { .. }));
    let err = engine.process(&common::sample(2, -1.0)).unwrap_err();
    assert!(matches!(err, InputError::Negative { .. }));

    assert_eq!(engine.snapshots(), before);
    assert_eq!(engine.stats().samples_rejected, 2);
}

#[test]
fn retraining_on_observations_keeps_attribution() {
    let settings = EngineSettings {
        max_observations: 50,
        ..EngineSettings::default()
    };
    let mut engine =
        DisaggregationEngine::new(common::disjoint_catalog(), settings, LatestSink::new())
            .unwrap();

    for (i, w) in [60.0, 420.0, 2000.0, 70.0, 380.0].into_iter().enumerate() {
        engine.process(&common::sample(i as u32, w)).unwrap();
    }
    assert_eq!(engine.observations().count(), 5);

    engine.retrain().unwrap();
    assert_eq!(engine.stats().retrains, 1);

    let r = engine.process(&common::sample(10, 2200.0)).unwrap();
    assert_eq!(r.device_name.as_deref(), Some("oven"));
    assert!(engine.sink().get("oven").unwrap().is_on);
    assert!(!engine.sink().get("washing_machine").unwrap().is_on);
}

#[test]
fn report_scores_against_ground_truth() {
    let mut engine = common::recording_engine(common::disjoint_catalog());
    let mut tally = AccuracyTally::default();
    let readings = [
        (60.0, Some("refrigerator")),
        (450.0, Some("washing_machine")),
        (2000.0, Some("oven")),
        (3.0, None),
    ];
    for (i, (w, truth)) in readings.into_iter().enumerate() {
        let r = engine.process(&common::sample(i as u32, w)).unwrap();
        tally.record(r.device_name.as_deref(), truth);
    }

    let report = RunReport::from_engine(&engine, Some(&tally));
    assert_eq!(report.accuracy_pct, Some(100.0));
    assert_eq!(report.stats.samples_processed, 4);
    assert_eq!(report.stats.unattributed, 1);
    assert_eq!(report.devices.len(), 3);
    assert!(report.to_string().contains("Disaggregation Report"));
}
