//! Drives an engine over a whole trace: synthetic or replayed.

use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::devices::{DeviceSnapshot, SignatureCatalog};
use crate::error::Result;
use crate::io::replay::ReplayRow;
use crate::nilm::{
    AccuracyTally, DisaggregationEngine, LogSink, PowerSample, RunReport, VecSink,
};
use crate::synth::{HouseholdTrace, SyntheticReading};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    /// Every published snapshot, in publish order.
    pub history: Vec<DeviceSnapshot>,
    /// Final snapshot per device, in catalog order.
    pub latest: Vec<DeviceSnapshot>,
    /// Aggregate readings that were accepted, with their timestamps.
    pub aggregate: Vec<(DateTime<FixedOffset>, f64)>,
}

enum Reading<'a> {
    Sample(PowerSample),
    Raw(&'a str, DateTime<FixedOffset>),
}

/// Runs the synthetic household trace described by `config`.
///
/// # Errors
///
/// Returns an error if the catalog is invalid or bootstrap training fails.
pub fn run_synthetic(config: &EngineConfig) -> Result<RunOutcome> {
    let catalog = config.catalog()?;
    let trace = HouseholdTrace::new(&catalog, config.trace_settings());
    info!(
        devices = catalog.len(),
        samples = trace.total_steps(),
        "running synthetic trace"
    );
    let readings = trace.map(|SyntheticReading { sample, truth }| (Reading::Sample(sample), truth));
    run(config, catalog, readings, true)
}

/// Replays recorded rows. Accuracy is scored only when some row carries a
/// device label.
///
/// # Errors
///
/// Returns an error if the catalog is invalid or bootstrap training fails.
pub fn run_replay(config: &EngineConfig, rows: &[ReplayRow]) -> Result<RunOutcome> {
    let catalog = config.catalog()?;
    let labeled = rows.iter().any(|r| r.truth.is_some());
    info!(rows = rows.len(), labeled, "replaying recorded readings");
    let readings = rows
        .iter()
        .map(|r| (Reading::Raw(r.watts.as_str(), r.timestamp), r.truth.clone()));
    run(config, catalog, readings, labeled)
}

fn run<'a>(
    config: &EngineConfig,
    catalog: SignatureCatalog,
    readings: impl Iterator<Item = (Reading<'a>, Option<String>)>,
    score: bool,
) -> Result<RunOutcome> {
    let sink = (LogSink::new(), VecSink::new());
    let mut engine = DisaggregationEngine::new(catalog, config.engine_settings(), sink)?;
    let mut tally = AccuracyTally::default();
    let mut aggregate = Vec::new();
    let every = config.retrain.every_samples;

    for (reading, truth) in readings {
        let (outcome, timestamp, watts) = match reading {
            Reading::Sample(sample) => (engine.process(&sample), sample.timestamp, sample.watts),
            Reading::Raw(raw, ts) => {
                let watts = raw.trim().parse::<f64>().unwrap_or_default();
                (engine.process_raw(raw, ts), ts, watts)
            }
        };
        let Ok(result) = outcome else {
            continue;
        };
        aggregate.push((timestamp, watts));
        if score {
            tally.record(result.device_name.as_deref(), truth.as_deref());
        }

        let processed = engine.stats().samples_processed;
        if every > 0 && processed % every as u64 == 0 {
            if let Err(e) = engine.retrain() {
                warn!(error = %e, "retraining failed, keeping previous model");
            }
        }
    }

    let report = RunReport::from_engine(&engine, score.then_some(&tally));
    let latest = engine.snapshots();
    let history = engine.into_sink().1.into_inner();
    Ok(RunOutcome {
        report,
        history,
        latest,
        aggregate,
    })
}
