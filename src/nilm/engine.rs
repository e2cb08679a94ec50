//! Disaggregation engine that routes classified samples to device trackers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::classifier::{ClassificationResult, Classifier, ClassifierSettings};
use crate::devices::{
    DeviceRecord, DeviceSnapshot, DeviceStateTracker, LabeledSample, SignatureCatalog,
};
use crate::error::{ClassificationError, InputError};

use super::sample::PowerSample;
use super::sink::{NullSink, UpdateSink};

/// Construction-time knobs for [`DisaggregationEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Classifier tuning, including the sensitivity threshold.
    pub classifier: ClassifierSettings,
    /// ON threshold for signatures whose `min_power` is 0 (W).
    pub min_power_w: f64,
    /// Bootstrap samples generated per catalog device.
    pub bootstrap_samples: usize,
    /// Capacity of the observation buffer; `0` disables it.
    pub max_observations: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            classifier: ClassifierSettings::default(),
            min_power_w: 10.0,
            bootstrap_samples: 20,
            max_observations: 0,
        }
    }
}

impl EngineSettings {
    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.classifier.sensitivity = sensitivity;
        self
    }

    pub fn sensitivity(&self) -> f64 {
        self.classifier.sensitivity
    }
}

/// Running counters kept by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Samples that passed validation.
    pub samples_processed: u64,
    /// Samples dropped with an `InputError`.
    pub samples_rejected: u64,
    /// Processed samples attributed to no device.
    pub unattributed: u64,
    /// Classification errors degraded to "no device active".
    pub classification_faults: u64,
    /// Successful calls to [`DisaggregationEngine::retrain`].
    pub retrains: u64,
}

impl EngineStats {
    pub fn attributed(&self) -> u64 {
        self.samples_processed - self.unattributed
    }
}

/// Turns a stream of aggregate readings into per-device state.
///
/// Owns one [`DeviceStateTracker`] per catalog signature, created up front
/// in catalog order. Each accepted sample is classified once; the matching
/// tracker receives the attributed power and every other tracker an
/// explicit zero update, and every resulting snapshot goes to the sink.
///
/// The classifier is shared (`Arc`) so another thread can retrain it while
/// this engine keeps processing.
pub struct DisaggregationEngine<S: UpdateSink = NullSink> {
    catalog: SignatureCatalog,
    settings: EngineSettings,
    classifier: Arc<Classifier>,
    trackers: Vec<DeviceStateTracker>,
    index: HashMap<String, usize>,
    sink: S,
    stats: EngineStats,
    observations: VecDeque<LabeledSample>,
}

impl<S: UpdateSink> DisaggregationEngine<S> {
    /// Creates an engine whose classifier is pre-trained on the catalog's
    /// bootstrap samples.
    ///
    /// # Errors
    ///
    /// Returns a `ClassificationError` if the classifier settings are out of
    /// range or bootstrap training fails (e.g. `bootstrap_samples == 0`).
    pub fn new(
        catalog: SignatureCatalog,
        settings: EngineSettings,
        sink: S,
    ) -> Result<Self, ClassificationError> {
        let classifier =
            Classifier::bootstrap(&catalog, settings.bootstrap_samples, settings.classifier)?;
        Ok(Self::with_classifier(
            catalog,
            settings,
            Arc::new(classifier),
            sink,
        ))
    }

    /// Creates an engine around an existing, possibly untrained, classifier.
    pub fn with_classifier(
        catalog: SignatureCatalog,
        settings: EngineSettings,
        classifier: Arc<Classifier>,
        sink: S,
    ) -> Self {
        let trackers: Vec<DeviceStateTracker> = catalog
            .iter()
            .map(|sig| DeviceStateTracker::new(sig.clone(), settings.min_power_w))
            .collect();
        let index = trackers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        Self {
            catalog,
            settings,
            classifier,
            trackers,
            index,
            sink,
            stats: EngineStats::default(),
            observations: VecDeque::with_capacity(settings.max_observations),
        }
    }

    /// Processes one reading.
    ///
    /// Returns the attribution applied this cycle. Classification faults are
    /// logged and degrade to a no-match result.
    ///
    /// # Errors
    ///
    /// Returns `InputError` for a non-finite or negative reading; the sample
    /// is dropped and no tracker is touched.
    pub fn process(&mut self, sample: &PowerSample) -> Result<ClassificationResult, InputError> {
        if let Err(e) = sample.validate() {
            self.reject(&e);
            return Err(e);
        }
        self.stats.samples_processed += 1;

        let mut result = match self.classifier.classify(sample.watts) {
            Ok(result) => result,
            Err(e) => {
                self.stats.classification_faults += 1;
                error!(watts = sample.watts, error = %e, "classification failed");
                ClassificationResult::no_match()
            }
        };

        let target = result.device_name.as_deref().and_then(|name| {
            let found = self.index.get(name).copied();
            if found.is_none() {
                warn!(device = name, "classifier label has no tracker, ignoring");
            }
            found
        });
        if target.is_none() && result.is_match() {
            result = ClassificationResult::no_match();
        }

        match target {
            Some(i) => debug!(
                watts = sample.watts,
                device = self.trackers[i].name(),
                confidence = result.confidence,
                "attributed"
            ),
            None => {
                self.stats.unattributed += 1;
                debug!(watts = sample.watts, "no attribution");
            }
        }

        for (i, tracker) in self.trackers.iter_mut().enumerate() {
            let snapshot = if Some(i) == target {
                tracker.update(result.attributed_power, result.confidence, sample.timestamp)
            } else {
                tracker.update(0.0, 0.0, sample.timestamp)
            };
            self.sink.publish(&snapshot);
        }

        if let Some(i) = target {
            self.observe(i, sample.watts);
        }

        Ok(result)
    }

    /// Coerces `raw` to a reading, then processes it.
    ///
    /// # Errors
    ///
    /// Returns `InputError` when `raw` is not a finite, non-negative number.
    pub fn process_raw(
        &mut self,
        raw: &str,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<ClassificationResult, InputError> {
        match PowerSample::parse(raw, timestamp) {
            Ok(sample) => self.process(&sample),
            Err(e) => {
                self.reject(&e);
                Err(e)
            }
        }
    }

    fn reject(&mut self, e: &InputError) {
        self.stats.samples_rejected += 1;
        warn!(error = %e, "dropping power sample");
    }

    fn observe(&mut self, tracker: usize, watts: f64) {
        let cap = self.settings.max_observations;
        if cap == 0 {
            return;
        }
        if self.observations.len() == cap {
            self.observations.pop_front();
        }
        self.observations
            .push_back(LabeledSample::new(watts, self.trackers[tracker].name()));
    }

    /// Bootstrap samples for the catalog followed by buffered observations.
    pub fn training_set(&self) -> Vec<LabeledSample> {
        let mut samples = self
            .catalog
            .generate_bootstrap_samples(self.settings.bootstrap_samples);
        samples.extend(self.observations.iter().cloned());
        samples
    }

    /// Refits the shared classifier on [`training_set`](Self::training_set).
    ///
    /// # Errors
    ///
    /// Propagates training failures; the previous model stays active.
    pub fn retrain(&mut self) -> Result<(), ClassificationError> {
        self.classifier.fit(&self.training_set())?;
        self.stats.retrains += 1;
        Ok(())
    }

    /// Buffered labeled observations, oldest first.
    pub fn observations(&self) -> impl Iterator<Item = &LabeledSample> {
        self.observations.iter()
    }

    /// Latest snapshot of every tracker that has seen at least one sample,
    /// in catalog order.
    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.trackers.iter().filter_map(|t| t.snapshot()).collect()
    }

    pub fn tracker(&self, name: &str) -> Option<&DeviceStateTracker> {
        self.index.get(name).map(|&i| &self.trackers[i])
    }

    pub fn trackers(&self) -> &[DeviceStateTracker] {
        &self.trackers
    }

    /// Durable records for every tracker, in catalog order.
    pub fn records(&self) -> Vec<DeviceRecord> {
        self.trackers.iter().map(DeviceStateTracker::record).collect()
    }

    /// Loads durable records into matching trackers and returns how many
    /// were applied. Records for unknown devices are skipped.
    pub fn restore(&mut self, records: &[DeviceRecord]) -> usize {
        let mut applied = 0;
        for record in records {
            match self.index.get(&record.name) {
                Some(&i) => {
                    self.trackers[i].restore(record);
                    applied += 1;
                }
                None => warn!(device = %record.name, "no tracker for restored record"),
            }
        }
        applied
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::devices::{DeviceSignature, DeviceState};
    use crate::nilm::sink::{LatestSink, VecSink};

    fn at(sec: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 10, 0, sec)
            .unwrap()
    }

    fn fridge_only() -> SignatureCatalog {
        SignatureCatalog::new(vec![DeviceSignature::new("refrigerator", 40.0, 100.0, 30)]).unwrap()
    }

    #[test]
    fn fridge_cycle_end_to_end() {
        let mut engine =
            DisaggregationEngine::new(fridge_only(), EngineSettings::default(), VecSink::new())
                .unwrap();

        let mut states = Vec::new();
        let mut runtimes = Vec::new();
        for (sec, watts) in [(0, 5.0), (1, 60.0), (2, 60.0), (3, 5.0)] {
            engine.process(&PowerSample::new(at(sec), watts)).unwrap();
            let t = engine.tracker("refrigerator").unwrap();
            states.push(t.state());
            runtimes.push(t.cumulative_runtime().as_secs_f64());
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
        assert!((runtimes[2] - 2.0).abs() < 1e-9);
        assert_eq!(engine.sink().len(), 4);
        assert_eq!(engine.stats().unattributed, 2);
    }

    #[test]
    fn every_tracker_gets_one_update_per_sample() {
        let mut engine = DisaggregationEngine::new(
            SignatureCatalog::builtin(),
            EngineSettings::default(),
            VecSink::new(),
        )
        .unwrap();
        let result = engine.process(&PowerSample::new(at(0), 3500.0)).unwrap();
        assert_eq!(result.device_name.as_deref(), Some("dryer"));
        assert_eq!(engine.sink().len(), 9);
        let on: Vec<&str> = engine
            .sink()
            .snapshots()
            .iter()
            .filter(|s| s.is_on)
            .map(|s| s.device_name.as_str())
            .collect();
        assert_eq!(on, vec!["dryer"]);
    }

    #[test]
    fn out_of_range_sensitivity_is_an_error() {
        let settings = EngineSettings::default().with_sensitivity(1.5);
        let err = DisaggregationEngine::new(fridge_only(), settings, NullSink).err();
        assert!(matches!(err, Some(ClassificationError::InvalidSettings(_))));
    }

    #[test]
    fn invalid_input_leaves_state_untouched() {
        let mut engine =
            DisaggregationEngine::new(fridge_only(), EngineSettings::default(), VecSink::new())
                .unwrap();
        engine.process(&PowerSample::new(at(0), 60.0)).unwrap();
        let before = engine.snapshots();

        assert!(engine.process(&PowerSample::new(at(1), -5.0)).is_err());
        assert!(engine.process(&PowerSample::new(at(2), f64::NAN)).is_err());
        assert!(engine.process_raw("unavailable", at(3)).is_err());

        assert_eq!(engine.snapshots(), before);
        assert_eq!(engine.sink().len(), 1);
        assert_eq!(engine.stats().samples_rejected, 3);
        assert_eq!(engine.stats().samples_processed, 1);
    }

    #[test]
    fn process_raw_accepts_numeric_text() {
        let mut engine =
            DisaggregationEngine::new(fridge_only(), EngineSettings::default(), NullSink).unwrap();
        let r = engine.process_raw(" 60 ", at(0)).unwrap();
        assert_eq!(r.device_name.as_deref(), Some("refrigerator"));
    }

    #[test]
    fn untrained_classifier_degrades_to_no_attribution() {
        let classifier = Arc::new(Classifier::new(ClassifierSettings::default()).unwrap());
        let mut engine = DisaggregationEngine::with_classifier(
            fridge_only(),
            EngineSettings::default(),
            classifier,
            LatestSink::new(),
        );
        let r = engine.process(&PowerSample::new(at(0), 60.0)).unwrap();
        assert!(!r.is_match());
        assert_eq!(engine.stats().classification_faults, 1);
        assert!(!engine.sink().get("refrigerator").unwrap().is_on);
    }

    #[test]
    fn foreign_label_is_ignored() {
        let classifier = Arc::new(Classifier::new(ClassifierSettings::default()).unwrap());
        classifier
            .fit(&[LabeledSample::new(2000.0, "kettle")])
            .unwrap();
        let mut engine = DisaggregationEngine::with_classifier(
            fridge_only(),
            EngineSettings::default(),
            classifier,
            NullSink,
        );
        let r = engine.process(&PowerSample::new(at(0), 2000.0)).unwrap();
        assert!(!r.is_match());
        assert_eq!(engine.stats().unattributed, 1);
    }

    #[test]
    fn observation_buffer_is_bounded_and_feeds_retrain() {
        let settings = EngineSettings {
            max_observations: 3,
            bootstrap_samples: 4,
            ..EngineSettings::default()
        };
        let mut engine = DisaggregationEngine::new(fridge_only(), settings, NullSink).unwrap();
        for (i, w) in [50.0, 55.0, 60.0, 65.0, 5.0].into_iter().enumerate() {
            engine.process(&PowerSample::new(at(i as u32), w)).unwrap();
        }
        let kept: Vec<f64> = engine.observations().map(|o| o.watts).collect();
        assert_eq!(kept, vec![55.0, 60.0, 65.0]);
        assert_eq!(engine.training_set().len(), 4 + 3);

        engine.retrain().unwrap();
        assert_eq!(engine.stats().retrains, 1);
        assert_eq!(engine.classifier().model().unwrap().generation(), 2);
    }

    #[test]
    fn restore_applies_known_records_only() {
        let mut engine = DisaggregationEngine::new(
            SignatureCatalog::builtin(),
            EngineSettings::default(),
            NullSink,
        )
        .unwrap();
        let records = vec![
            DeviceRecord {
                name: "tv".into(),
                cumulative_runtime_seconds: 120.0,
                daily_energy_kwh: 0.25,
                last_reset_date: Some(at(0).date_naive()),
            },
            DeviceRecord {
                name: "toaster".into(),
                cumulative_runtime_seconds: 1.0,
                daily_energy_kwh: 1.0,
                last_reset_date: None,
            },
        ];
        assert_eq!(engine.restore(&records), 1);
        assert_eq!(engine.tracker("tv").unwrap().daily_energy_kwh(), 0.25);
        assert_eq!(engine.records().len(), 9);
        assert_eq!(engine.records()[1].cumulative_runtime_seconds, 120.0);
    }
}
