//! Supervised power-to-device classifier with calibrated confidences.
//!
//! The model scales the scalar power feature with a standard scaler and keeps,
//! per device label, the scaled span covered by its training samples. A
//! class density is flat inside the span and falls off with a Gaussian tail
//! outside it:
//!
//! ```text
//! density_c(z) = exp(-0.5 * (d_c(z) / h_c)^2) / (span_c + h_c * sqrt(2*pi))
//! d_c(z)       = distance from z to [lo_c, hi_c]   (0 inside)
//! h_c          = max(edge_softness * span_c, min_bandwidth)
//! ```
//!
//! Confidences are the densities normalized across classes (computed in log
//! space, so they always sum to 1). A reading covered by at least one span is
//! shared only among the covering classes; tails rank readings that no span
//! covers. Narrow signatures are denser than wide ones, so inside an overlap
//! the more specific device wins.
//!
//! The trained model is immutable. Retraining builds a new model and swaps
//! the shared reference, so concurrent readers see either the old model or
//! the new one.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::devices::{LabeledSample, SignatureCatalog};
use crate::error::ClassificationError;

/// Default minimum confidence for accepting an attribution.
pub const DEFAULT_SENSITIVITY: f64 = 0.6;

/// Tuning knobs for the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSettings {
    /// Minimum arg-max confidence required for a match, in `(0, 1]`.
    pub sensitivity: f64,
    /// Tail width as a fraction of each class span.
    pub edge_softness: f64,
    /// Smallest tail width, in scaled units.
    pub min_bandwidth: f64,
    /// Readings whose best class support falls below this are unmatched.
    pub min_support: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            edge_softness: 0.01,
            min_bandwidth: 0.001,
            min_support: 1e-3,
        }
    }
}

impl ClassifierSettings {
    /// Checks every knob against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::InvalidSettings` naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), ClassificationError> {
        let invalid = |msg: &str| Err(ClassificationError::InvalidSettings(msg.to_string()));
        if !(self.sensitivity > 0.0 && self.sensitivity <= 1.0) {
            return invalid("sensitivity must be in (0, 1]");
        }
        if !(self.edge_softness.is_finite() && self.edge_softness >= 0.0) {
            return invalid("edge_softness must be >= 0");
        }
        if !(self.min_bandwidth.is_finite() && self.min_bandwidth > 0.0) {
            return invalid("min_bandwidth must be > 0");
        }
        if !(self.min_support > 0.0 && self.min_support <= 1.0) {
            return invalid("min_support must be in (0, 1]");
        }
        Ok(())
    }
}

/// Outcome of classifying one power reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Attributed device, `None` when no device matched.
    pub device_name: Option<String>,
    /// Confidence of the attribution in `[0, 1]`; `0.0` for no match.
    pub confidence: f64,
    /// Power credited to `device_name` (W); `0.0` for no match.
    pub attributed_power: f64,
}

impl ClassificationResult {
    pub fn matched(device_name: impl Into<String>, confidence: f64, attributed_power: f64) -> Self {
        Self {
            device_name: Some(device_name.into()),
            confidence,
            attributed_power,
        }
    }

    pub fn no_match() -> Self {
        Self {
            device_name: None,
            confidence: 0.0,
            attributed_power: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        self.device_name.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
struct Scaler {
    mean: f64,
    scale: f64,
}

impl Scaler {
    fn fit(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        // A constant feature is left unscaled.
        let scale = if std > f64::EPSILON { std } else { 1.0 };
        Self { mean, scale }
    }

    fn transform(&self, x: f64) -> f64 {
        (x - self.mean) / self.scale
    }
}

#[derive(Debug, Clone)]
struct ClassSpan {
    label: String,
    lo: f64,
    hi: f64,
    bandwidth: f64,
    log_norm: f64,
    samples: usize,
}

impl ClassSpan {
    fn new(label: String, lo: f64, hi: f64, samples: usize, settings: &ClassifierSettings) -> Self {
        let span = hi - lo;
        let bandwidth = (settings.edge_softness * span).max(settings.min_bandwidth);
        let mass = span + bandwidth * (2.0 * PI).sqrt();
        Self {
            label,
            lo,
            hi,
            bandwidth,
            log_norm: -mass.ln(),
            samples,
        }
    }

    /// `ln` of the un-normalized tail factor; `0.0` inside the span.
    fn log_support(&self, z: f64) -> f64 {
        let d = if z < self.lo {
            self.lo - z
        } else if z > self.hi {
            z - self.hi
        } else {
            0.0
        };
        let r = d / self.bandwidth;
        -0.5 * r * r
    }
}

/// Immutable trained model.
#[derive(Debug, Clone)]
pub struct Model {
    scaler: Scaler,
    classes: Vec<ClassSpan>,
    generation: u64,
}

/// Per-class evaluation of one reading.
struct Evaluation {
    probabilities: Vec<f64>,
    best_support: f64,
}

impl Model {
    fn fit(
        samples: &[LabeledSample],
        settings: &ClassifierSettings,
        generation: u64,
    ) -> Result<Self, ClassificationError> {
        if samples.is_empty() {
            return Err(ClassificationError::Training(
                "no training samples".to_string(),
            ));
        }
        for s in samples {
            if !s.watts.is_finite() || s.watts < 0.0 {
                return Err(ClassificationError::Training(format!(
                    "sample for \"{}\" has invalid power {}",
                    s.label, s.watts
                )));
            }
            if s.label.trim().is_empty() {
                return Err(ClassificationError::Training(
                    "sample with blank label".to_string(),
                ));
            }
        }

        let values: Vec<f64> = samples.iter().map(|s| s.watts).collect();
        let scaler = Scaler::fit(&values);

        // Keep first-seen label order so ties resolve deterministically.
        let mut order: Vec<&str> = Vec::new();
        let mut bounds: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
        for s in samples {
            let z = scaler.transform(s.watts);
            let entry = bounds.entry(s.label.as_str()).or_insert_with(|| {
                order.push(s.label.as_str());
                (z, z, 0)
            });
            entry.0 = entry.0.min(z);
            entry.1 = entry.1.max(z);
            entry.2 += 1;
        }

        let classes = order
            .into_iter()
            .map(|label| {
                let (lo, hi, n) = bounds[label];
                ClassSpan::new(label.to_string(), lo, hi, n, settings)
            })
            .collect();

        Ok(Self {
            scaler,
            classes,
            generation,
        })
    }

    fn evaluate(&self, watts: f64) -> Result<Evaluation, ClassificationError> {
        if !watts.is_finite() {
            return Err(ClassificationError::Numeric {
                watts,
                detail: "input is not finite".to_string(),
            });
        }
        let z = self.scaler.transform(watts);
        let log_support: Vec<f64> = self.classes.iter().map(|c| c.log_support(z)).collect();
        // a covering span excludes every class whose span does not cover z
        let covered = log_support.iter().any(|&ls| ls == 0.0);
        let log_density: Vec<f64> = self
            .classes
            .iter()
            .zip(&log_support)
            .map(|(c, &ls)| {
                if covered && ls < 0.0 {
                    f64::NEG_INFINITY
                } else {
                    ls + c.log_norm
                }
            })
            .collect();

        let max_log = log_density
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = log_density.iter().map(|l| (l - max_log).exp()).collect();
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(ClassificationError::Numeric {
                watts,
                detail: format!("density normalizer is {total}"),
            });
        }

        let best_support = log_support
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
            .exp();

        Ok(Evaluation {
            probabilities: weights.into_iter().map(|w| w / total).collect(),
            best_support,
        })
    }

    /// Labels in model order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|c| c.label.as_str())
    }

    /// Number of training samples seen for `label`.
    pub fn sample_count(&self, label: &str) -> Option<usize> {
        self.classes
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.samples)
    }

    /// Monotonic counter identifying which `fit` produced this model.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Thread-safe, retrainable classifier.
///
/// Share it as `Arc<Classifier>` between the engine and a maintenance task;
/// `fit` publishes a whole new model in one swap.
///
/// # Examples
///
/// ```
/// use nilm_engine::classifier::{Classifier, ClassifierSettings};
/// use nilm_engine::devices::SignatureCatalog;
///
/// let catalog = SignatureCatalog::builtin();
/// let classifier = Classifier::bootstrap(&catalog, 20, ClassifierSettings::default()).unwrap();
///
/// let result = classifier.classify(60.0).unwrap();
/// assert_eq!(result.device_name.as_deref(), Some("refrigerator"));
/// assert!(result.confidence > 0.6);
///
/// // far from every signature
/// assert!(!classifier.classify(5.0).unwrap().is_match());
/// ```
#[derive(Debug)]
pub struct Classifier {
    settings: ClassifierSettings,
    model: RwLock<Option<Arc<Model>>>,
}

impl Classifier {
    /// Creates an untrained classifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSettings` when [`ClassifierSettings::validate`] fails.
    pub fn new(settings: ClassifierSettings) -> Result<Self, ClassificationError> {
        settings.validate()?;
        Ok(Self {
            settings,
            model: RwLock::new(None),
        })
    }

    /// Creates a classifier pre-trained on the catalog's bootstrap samples.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSettings` for out-of-range settings and propagates
    /// training failures (e.g. `per_device == 0`).
    pub fn bootstrap(
        catalog: &SignatureCatalog,
        per_device: usize,
        settings: ClassifierSettings,
    ) -> Result<Self, ClassificationError> {
        let classifier = Self::new(settings)?;
        classifier.fit(&catalog.generate_bootstrap_samples(per_device))?;
        Ok(classifier)
    }

    /// Trains a new model on `samples` and atomically replaces the active one.
    ///
    /// On error the previous model stays active.
    ///
    /// # Errors
    ///
    /// Returns `ClassificationError::Training` for empty input, negative or
    /// non-finite powers, or blank labels.
    pub fn fit(&self, samples: &[LabeledSample]) -> Result<(), ClassificationError> {
        let generation = self.model().map_or(1, |m| m.generation + 1);
        let model = Model::fit(samples, &self.settings, generation)?;
        info!(
            samples = samples.len(),
            classes = model.classes.len(),
            generation,
            "classifier model trained"
        );
        *self.model.write() = Some(Arc::new(model));
        Ok(())
    }

    /// Classifies one power reading.
    ///
    /// Returns a match only when the arg-max confidence exceeds the
    /// configured sensitivity and at least one signature supports the reading.
    ///
    /// # Errors
    ///
    /// `ModelUnavailable` before the first `fit`; `Numeric` for non-finite input.
    pub fn classify(&self, watts: f64) -> Result<ClassificationResult, ClassificationError> {
        let model = self.model().ok_or(ClassificationError::ModelUnavailable)?;
        let eval = model.evaluate(watts)?;
        if eval.best_support < self.settings.min_support {
            return Ok(ClassificationResult::no_match());
        }

        let Some((best, &confidence)) = eval
            .probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            return Ok(ClassificationResult::no_match());
        };

        if confidence > self.settings.sensitivity {
            Ok(ClassificationResult::matched(
                model.classes[best].label.clone(),
                confidence,
                watts,
            ))
        } else {
            Ok(ClassificationResult::no_match())
        }
    }

    /// Full per-class confidence distribution for `watts`, in model order.
    ///
    /// # Errors
    ///
    /// Same as [`classify`](Self::classify).
    pub fn probabilities(&self, watts: f64) -> Result<Vec<(String, f64)>, ClassificationError> {
        let model = self.model().ok_or(ClassificationError::ModelUnavailable)?;
        let eval = model.evaluate(watts)?;
        Ok(model
            .labels()
            .map(str::to_string)
            .zip(eval.probabilities)
            .collect())
    }

    /// The currently published model, if any.
    pub fn model(&self) -> Option<Arc<Model>> {
        self.model.read().clone()
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().is_some()
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn sensitivity(&self) -> f64 {
        self.settings.sensitivity
    }
}
