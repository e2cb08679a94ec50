//! TOML-based engine configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::classifier::{ClassifierSettings, DEFAULT_SENSITIVITY};
use crate::devices::{DeviceSignature, SignatureCatalog};
use crate::nilm::EngineSettings;
use crate::synth::TraceSettings;

/// Top-level configuration parsed from TOML.
///
/// Every table is optional and falls back to the defaults of the `default`
/// preset. Load with [`EngineConfig::from_toml_file`] or pick a preset with
/// [`EngineConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine thresholds and bootstrap size.
    #[serde(default)]
    pub engine: EngineSection,
    /// Classifier shape parameters.
    #[serde(default)]
    pub classifier: ClassifierSection,
    /// Enabled built-in devices and custom signatures.
    #[serde(default)]
    pub devices: DevicesSection,
    /// Observation buffer and retraining cadence.
    #[serde(default)]
    pub retrain: RetrainSection,
    /// Synthetic trace used when no input file is given.
    #[serde(default)]
    pub trace: TraceSection,
    /// Log level fallback.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Engine thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Minimum classification confidence, in (0, 1].
    pub sensitivity: f64,
    /// Global ON floor for signatures without a minimum (W).
    pub min_power_w: f64,
    /// Bootstrap samples generated per device (>= 1).
    pub bootstrap_samples: usize,
    /// Expected seconds between meter readings.
    pub scan_interval_s: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            min_power_w: 10.0,
            bootstrap_samples: 20,
            scan_interval_s: 30,
        }
    }
}

/// Classifier shape parameters (see [`ClassifierSettings`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSection {
    pub edge_softness: f64,
    pub min_bandwidth: f64,
    pub min_support: f64,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        let d = ClassifierSettings::default();
        Self {
            edge_softness: d.edge_softness,
            min_bandwidth: d.min_bandwidth,
            min_support: d.min_support,
        }
    }
}

/// Device selection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DevicesSection {
    /// Built-in devices to track; all of them when absent.
    pub enabled: Option<Vec<String>>,
    /// Extra signatures appended after the built-ins.
    pub custom: Vec<DeviceSignature>,
}

/// Retraining from observed attributions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrainSection {
    /// Observation buffer capacity; `0` disables it.
    pub max_observations: usize,
    /// Retrain after this many processed samples; `0` never retrains.
    pub every_samples: usize,
}

/// Synthetic trace parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceSection {
    /// Trace length (hours, > 0).
    pub hours: u32,
    /// Master random seed.
    pub seed: u64,
    /// Mean standby draw (W).
    pub standby_w: f64,
    /// Minimum idle gap between appliance runs (minutes).
    pub idle_min_minutes: u32,
    /// Maximum idle gap between appliance runs (minutes).
    pub idle_max_minutes: u32,
}

impl Default for TraceSection {
    fn default() -> Self {
        let d = TraceSettings::default();
        Self {
            hours: d.hours,
            seed: d.seed,
            standby_w: d.standby_w,
            idle_min_minutes: d.idle_minutes.0,
            idle_max_minutes: d.idle_minutes.1,
        }
    }
}

/// Logging fallback used when `RUST_LOG` is unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"engine.sensitivity"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Tracks every built-in appliance with default thresholds.
    pub fn default_preset() -> Self {
        Self::default()
    }

    /// Tracks the five most common appliances only.
    pub fn essentials() -> Self {
        Self {
            devices: DevicesSection {
                enabled: Some(
                    ["refrigerator", "tv", "microwave", "washing_machine", "oven"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                custom: Vec::new(),
            },
            ..Self::default()
        }
    }

    /// Lower confidence bar and ON floor, trading precision for recall.
    pub fn sensitive() -> Self {
        Self {
            engine: EngineSection {
                sensitivity: 0.5,
                min_power_w: 5.0,
                ..EngineSection::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["default", "essentials", "sensitive"];

    /// Loads a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::default_preset()),
            "essentials" => Ok(Self::essentials()),
            "sensitive" => Ok(Self::sensitive()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Builds the signature catalog: the enabled built-ins followed by any
    /// custom signatures.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for unknown enabled names, duplicate names, or
    /// invalid custom ranges.
    pub fn catalog(&self) -> Result<SignatureCatalog, ConfigError> {
        let builtin = SignatureCatalog::builtin();
        let selected = match &self.devices.enabled {
            Some(names) if names.is_empty() && !self.devices.custom.is_empty() => {
                return SignatureCatalog::new(self.devices.custom.clone())
                    .map_err(|e| ConfigError::new("devices.custom", e.to_string()));
            }
            Some(names) => builtin
                .select(names)
                .map_err(|e| ConfigError::new("devices.enabled", e.to_string()))?,
            None => builtin,
        };
        if self.devices.custom.is_empty() {
            return Ok(selected);
        }
        selected
            .extended(self.devices.custom.clone())
            .map_err(|e| ConfigError::new("devices.custom", e.to_string()))
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            sensitivity: self.engine.sensitivity,
            edge_softness: self.classifier.edge_softness,
            min_bandwidth: self.classifier.min_bandwidth,
            min_support: self.classifier.min_support,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            classifier: self.classifier_settings(),
            min_power_w: self.engine.min_power_w,
            bootstrap_samples: self.engine.bootstrap_samples,
            max_observations: self.retrain.max_observations,
        }
    }

    pub fn trace_settings(&self) -> TraceSettings {
        TraceSettings {
            hours: self.trace.hours,
            interval_s: self.engine.scan_interval_s,
            seed: self.trace.seed,
            standby_w: self.trace.standby_w,
            idle_minutes: (self.trace.idle_min_minutes, self.trace.idle_max_minutes),
            ..TraceSettings::default()
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let e = &self.engine;

        if !(e.sensitivity > 0.0 && e.sensitivity <= 1.0) {
            errors.push(ConfigError::new("engine.sensitivity", "must be in (0.0, 1.0]"));
        }
        if !(e.min_power_w > 0.0 && e.min_power_w <= 1000.0) {
            errors.push(ConfigError::new("engine.min_power_w", "must be in (0, 1000]"));
        }
        if e.bootstrap_samples == 0 {
            errors.push(ConfigError::new("engine.bootstrap_samples", "must be >= 1"));
        }
        if !(5..=3600).contains(&e.scan_interval_s) {
            errors.push(ConfigError::new("engine.scan_interval_s", "must be in [5, 3600]"));
        }

        let c = &self.classifier;
        if !(c.edge_softness.is_finite() && c.edge_softness >= 0.0) {
            errors.push(ConfigError::new("classifier.edge_softness", "must be >= 0"));
        }
        if !(c.min_bandwidth.is_finite() && c.min_bandwidth > 0.0) {
            errors.push(ConfigError::new("classifier.min_bandwidth", "must be > 0"));
        }
        if !(c.min_support > 0.0 && c.min_support <= 1.0) {
            errors.push(ConfigError::new("classifier.min_support", "must be in (0.0, 1.0]"));
        }

        if let Some(names) = &self.devices.enabled {
            if names.is_empty() && self.devices.custom.is_empty() {
                errors.push(ConfigError::new(
                    "devices.enabled",
                    "must name at least one device when no custom devices are given",
                ));
            }
        }
        if let Err(err) = self.catalog() {
            if !(self.devices.enabled.as_ref().is_some_and(Vec::is_empty)
                && self.devices.custom.is_empty())
            {
                errors.push(err);
            }
        }

        let t = &self.trace;
        if t.hours == 0 {
            errors.push(ConfigError::new("trace.hours", "must be > 0"));
        }
        if !(t.standby_w.is_finite() && t.standby_w >= 0.0) {
            errors.push(ConfigError::new("trace.standby_w", "must be >= 0"));
        }
        if t.idle_min_minutes > t.idle_max_minutes {
            errors.push(ConfigError::new(
                "trace.idle_min_minutes",
                "must be <= trace.idle_max_minutes",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(ConfigError::new(
                "logging.level",
                format!(
                    "must be one of {}, got \"{}\"",
                    LOG_LEVELS.join(", "),
                    self.logging.level
                ),
            ));
        }

        errors
    }
}
