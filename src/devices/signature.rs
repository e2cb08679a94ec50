//! Device power signatures and the catalog that holds them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// A labeled power reading used to train the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    /// Power in watts.
    pub watts: f64,
    /// Device name the reading belongs to.
    pub label: String,
}

impl LabeledSample {
    pub fn new(watts: f64, label: impl Into<String>) -> Self {
        Self {
            watts,
            label: label.into(),
        }
    }
}

/// Characteristic power range of one appliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSignature {
    /// Unique device name.
    pub name: String,
    /// Lowest power drawn while running (W).
    pub min_power: f64,
    /// Highest power drawn while running (W).
    pub max_power: f64,
    /// Typical cycle duration in minutes, `0` for appliances without a cycle.
    #[serde(default, rename = "cycle_time")]
    pub cycle_time_hint: u32,
}

impl DeviceSignature {
    pub fn new(name: impl Into<String>, min_power: f64, max_power: f64, cycle_time_hint: u32) -> Self {
        Self {
            name: name.into(),
            min_power,
            max_power,
            cycle_time_hint,
        }
    }

    /// Returns `true` when `watts` lies within `[min_power, max_power]`.
    pub fn contains(&self, watts: f64) -> bool {
        watts >= self.min_power && watts <= self.max_power
    }

    /// Returns `true` when the two power ranges share at least one value.
    pub fn overlaps(&self, other: &DeviceSignature) -> bool {
        self.min_power <= other.max_power && other.min_power <= self.max_power
    }

    fn check(&self) -> Result<(), CatalogError> {
        let invalid = |message: &str| CatalogError::InvalidSignature {
            name: self.name.clone(),
            message: message.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be blank"));
        }
        if !self.min_power.is_finite() || !self.max_power.is_finite() {
            return Err(invalid("power bounds must be finite"));
        }
        if self.min_power < 0.0 {
            return Err(invalid("min_power must be >= 0"));
        }
        if self.min_power > self.max_power {
            return Err(invalid("min_power must be <= max_power"));
        }
        Ok(())
    }
}

/// Built-in appliance signatures: `(name, min W, max W, cycle minutes)`.
const BUILTIN_SIGNATURES: &[(&str, f64, f64, u32)] = &[
    ("refrigerator", 40.0, 100.0, 30),
    ("tv", 80.0, 150.0, 0),
    ("microwave", 800.0, 1200.0, 0),
    ("washing_machine", 300.0, 500.0, 45),
    ("dishwasher", 200.0, 400.0, 60),
    ("oven", 1500.0, 2500.0, 0),
    ("dryer", 2000.0, 4000.0, 45),
    ("air_conditioner", 500.0, 1500.0, 20),
    ("water_heater", 1000.0, 3000.0, 0),
];

/// Read-only, ordered mapping of device name to signature.
///
/// # Examples
///
/// ```
/// use nilm_engine::devices::SignatureCatalog;
///
/// let catalog = SignatureCatalog::builtin();
/// assert_eq!(catalog.len(), 9);
/// let fridge = catalog.get("refrigerator").unwrap();
/// assert_eq!(fridge.min_power, 40.0);
/// ```
#[derive(Debug, Clone)]
pub struct SignatureCatalog {
    signatures: Vec<DeviceSignature>,
    index: HashMap<String, usize>,
}

impl SignatureCatalog {
    /// Builds a catalog, rejecting empty input, duplicates, and invalid ranges.
    ///
    /// # Errors
    ///
    /// Returns a `CatalogError` describing the first offending signature.
    pub fn new(signatures: Vec<DeviceSignature>) -> Result<Self, CatalogError> {
        if signatures.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut index = HashMap::with_capacity(signatures.len());
        for (i, sig) in signatures.iter().enumerate() {
            sig.check()?;
            if index.insert(sig.name.clone(), i).is_some() {
                return Err(CatalogError::Duplicate(sig.name.clone()));
            }
        }
        Ok(Self { signatures, index })
    }

    /// The nine household appliances known out of the box.
    pub fn builtin() -> Self {
        let signatures = BUILTIN_SIGNATURES
            .iter()
            .map(|&(name, min, max, cycle)| DeviceSignature::new(name, min, max, cycle))
            .collect::<Vec<_>>();
        let index = signatures
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self { signatures, index }
    }

    /// Names of the built-in appliances, in catalog order.
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN_SIGNATURES.iter().map(|&(name, ..)| name)
    }

    /// Returns a catalog holding only the named devices, in this catalog's order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDevice` for a name not present here, or `Empty` if
    /// `names` selects nothing.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, CatalogError> {
        for name in names {
            if !self.index.contains_key(name.as_ref()) {
                return Err(CatalogError::UnknownDevice(name.as_ref().to_string()));
            }
        }
        let kept = self
            .signatures
            .iter()
            .filter(|s| names.iter().any(|n| n.as_ref() == s.name))
            .cloned()
            .collect();
        Self::new(kept)
    }

    /// Returns a catalog with `extra` signatures appended.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names or invalid ranges in `extra`.
    pub fn extended(&self, extra: Vec<DeviceSignature>) -> Result<Self, CatalogError> {
        let mut all = self.signatures.clone();
        all.extend(extra);
        Self::new(all)
    }

    pub fn get(&self, name: &str) -> Option<&DeviceSignature> {
        self.index.get(name).map(|&i| &self.signatures[i])
    }

    /// Position of `name` in catalog order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceSignature> {
        self.signatures.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Synthesizes `per_device` evenly spaced readings across each
    /// signature's `[min_power, max_power]`, labeled with the device name.
    ///
    /// A single reading at `min_power` is produced when `per_device == 1` or
    /// the range is degenerate. `per_device == 0` yields nothing.
    pub fn generate_bootstrap_samples(&self, per_device: usize) -> Vec<LabeledSample> {
        let mut samples = Vec::with_capacity(per_device * self.signatures.len());
        for sig in &self.signatures {
            if per_device == 0 {
                break;
            }
            let span = sig.max_power - sig.min_power;
            if per_device == 1 || span <= 0.0 {
                samples.push(LabeledSample::new(sig.min_power, &sig.name));
                continue;
            }
            let step = span / (per_device - 1) as f64;
            for i in 0..per_device {
                let watts = if i + 1 == per_device {
                    sig.max_power
                } else {
                    sig.min_power + step * i as f64
                };
                samples.push(LabeledSample::new(watts, &sig.name));
            }
        }
        samples
    }
}

impl<'a> IntoIterator for &'a SignatureCatalog {
    type Item = &'a DeviceSignature;
    type IntoIter = std::slice::Iter<'a, DeviceSignature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.iter()
    }
}
