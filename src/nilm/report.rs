//! End-of-run summary computed from engine state.

use std::fmt;

use serde::Serialize;

use crate::devices::DeviceStateTracker;

use super::engine::{DisaggregationEngine, EngineStats};
use super::sink::UpdateSink;

/// Running comparison of attributions against known labels.
///
/// `None` on either side means "no device".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccuracyTally {
    pub total: u64,
    pub correct: u64,
}

impl AccuracyTally {
    pub fn record(&mut self, predicted: Option<&str>, truth: Option<&str>) {
        self.total += 1;
        if predicted == truth {
            self.correct += 1;
        }
    }

    /// Share of correct attributions in percent, `None` before any sample.
    pub fn accuracy_pct(&self) -> Option<f64> {
        (self.total > 0).then(|| 100.0 * self.correct as f64 / self.total as f64)
    }
}

/// Final state of one tracked device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub device_name: String,
    pub is_on: bool,
    pub activations: u64,
    pub cumulative_runtime_seconds: f64,
    pub daily_energy_kwh: f64,
}

impl From<&DeviceStateTracker> for DeviceSummary {
    fn from(t: &DeviceStateTracker) -> Self {
        Self {
            device_name: t.name().to_string(),
            is_on: t.state().is_on(),
            activations: t.activations(),
            cumulative_runtime_seconds: t.cumulative_runtime().as_secs_f64(),
            daily_energy_kwh: t.daily_energy_kwh(),
        }
    }
}

/// Aggregate indicators for a complete run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub stats: EngineStats,
    /// Attribution accuracy against ground truth (%), when labels were known.
    pub accuracy_pct: Option<f64>,
    /// Share of processed samples attributed to some device (%).
    pub coverage_pct: f64,
    /// Per-device summary in catalog order.
    pub devices: Vec<DeviceSummary>,
}

impl RunReport {
    /// Builds the report from an engine's counters and trackers.
    ///
    /// # Arguments
    ///
    /// * `engine` - Engine after the run
    /// * `tally` - Ground-truth comparison, if the input carried labels
    pub fn from_engine<S: UpdateSink>(
        engine: &DisaggregationEngine<S>,
        tally: Option<&AccuracyTally>,
    ) -> Self {
        let stats = engine.stats();
        let coverage_pct = if stats.samples_processed > 0 {
            100.0 * stats.attributed() as f64 / stats.samples_processed as f64
        } else {
            0.0
        };
        Self {
            stats,
            accuracy_pct: tally.and_then(AccuracyTally::accuracy_pct),
            coverage_pct,
            devices: engine.trackers().iter().map(DeviceSummary::from).collect(),
        }
    }

    /// Sum of the per-device daily energy totals (kWh).
    pub fn total_daily_energy_kwh(&self) -> f64 {
        self.devices.iter().map(|d| d.daily_energy_kwh).sum()
    }

    pub fn device(&self, name: &str) -> Option<&DeviceSummary> {
        self.devices.iter().find(|d| d.device_name == name)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "--- Disaggregation Report ---")?;
        writeln!(f, "Samples processed:     {}", s.samples_processed)?;
        writeln!(f, "Samples rejected:      {}", s.samples_rejected)?;
        writeln!(
            f,
            "Attributed:            {} ({:.1}%)",
            s.attributed(),
            self.coverage_pct
        )?;
        writeln!(f, "Classifier faults:     {}", s.classification_faults)?;
        writeln!(f, "Retrains:              {}", s.retrains)?;
        match self.accuracy_pct {
            Some(pct) => writeln!(f, "Accuracy vs truth:     {pct:.1}%")?,
            None => writeln!(f, "Accuracy vs truth:     n/a")?,
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:<16} {:>5} {:>8} {:>12} {:>10}",
            "device", "state", "starts", "runtime (h)", "today kWh"
        )?;
        for d in &self.devices {
            writeln!(
                f,
                "{:<16} {:>5} {:>8} {:>12.2} {:>10.3}",
                d.device_name,
                if d.is_on { "ON" } else { "OFF" },
                d.activations,
                d.cumulative_runtime_seconds / 3600.0,
                d.daily_energy_kwh
            )?;
        }
        write!(
            f,
            "Total today:           {:.3} kWh",
            self.total_daily_energy_kwh()
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;
    use crate::devices::SignatureCatalog;
    use crate::nilm::engine::EngineSettings;
    use crate::nilm::sample::PowerSample;
    use crate::nilm::sink::NullSink;

    #[test]
    fn tally_counts_matches_including_none() {
        let mut tally = AccuracyTally::default();
        assert_eq!(tally.accuracy_pct(), None);
        tally.record(Some("tv"), Some("tv"));
        tally.record(None, None);
        tally.record(Some("tv"), Some("oven"));
        tally.record(None, Some("oven"));
        assert_eq!(tally.total, 4);
        assert_eq!(tally.accuracy_pct(), Some(50.0));
    }

    #[test]
    fn report_reflects_engine_state() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let mut engine = DisaggregationEngine::new(
            SignatureCatalog::builtin(),
            EngineSettings::default(),
            NullSink,
        )
        .unwrap();
        for (m, watts) in [(0, 3500.0), (30, 3500.0), (31, 0.0), (32, 90.0)] {
            let ts = tz.with_ymd_and_hms(2024, 2, 1, 9, m, 0).unwrap();
            engine.process(&PowerSample::new(ts, watts)).unwrap();
        }

        let report = RunReport::from_engine(&engine, None);
        assert_eq!(report.stats.samples_processed, 4);
        assert_eq!(report.devices.len(), 9);
        assert_eq!(report.accuracy_pct, None);
        assert!((report.coverage_pct - 50.0).abs() < 1e-9);

        let dryer = report.device("dryer").unwrap();
        assert_eq!(dryer.activations, 1);
        assert!((dryer.cumulative_runtime_seconds - 1800.0).abs() < 1e-9);
        assert!((dryer.daily_energy_kwh - 1.75).abs() < 1e-9);
        assert!((report.total_daily_energy_kwh() - 1.75).abs() < 1e-9);

        let text = report.to_string();
        assert!(text.contains("Disaggregation Report"));
        assert!(text.contains("dryer"));
    }

    #[test]
    fn empty_run_has_zero_coverage() {
        let engine = DisaggregationEngine::new(
            SignatureCatalog::builtin(),
            EngineSettings::default(),
            NullSink,
        )
        .unwrap();
        let report = RunReport::from_engine(&engine, Some(&AccuracyTally::default()));
        assert_eq!(report.coverage_pct, 0.0);
        assert_eq!(report.accuracy_pct, None);
        assert_eq!(report.devices[0].activations, 0);
    }
}
