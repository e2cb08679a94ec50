//! Seeded synthetic household power trace with ground-truth labels.

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::devices::{DeviceSignature, SignatureCatalog};
use crate::nilm::PowerSample;

/// Shape of the generated trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSettings {
    /// Timestamp of the first reading.
    pub start: DateTime<FixedOffset>,
    /// Trace length in hours.
    pub hours: u32,
    /// Seconds between readings.
    pub interval_s: u32,
    /// Master random seed.
    pub seed: u64,
    /// Mean standby draw between appliance runs (W).
    pub standby_w: f64,
    /// Standard deviation of the standby noise (W).
    pub standby_noise_w: f64,
    /// Idle gap between runs, inclusive range in minutes.
    pub idle_minutes: (u32, u32),
    /// Run length for appliances without a cycle hint, inclusive range in minutes.
    pub run_minutes: (u32, u32),
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            start: default_start(),
            hours: 24,
            interval_s: 30,
            seed: 42,
            standby_w: 3.0,
            standby_noise_w: 0.5,
            idle_minutes: (10, 60),
            run_minutes: (5, 30),
        }
    }
}

fn default_start() -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        .fixed_offset()
}

/// One generated reading plus the device actually running, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticReading {
    pub sample: PowerSample,
    pub truth: Option<String>,
}

/// Returns a Gaussian-distributed value with mean 0 (Box–Muller).
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos() * std_dev
}

#[derive(Debug, Clone)]
enum Phase {
    Idle { remaining: u64 },
    Running { device: usize, watts: f64, remaining: u64 },
}

/// Iterator over a deterministic single-appliance-at-a-time household trace.
///
/// Standby periods alternate with appliance runs. Each run picks a catalog
/// device, a power level inside the middle 80% of its signature, and a
/// duration (the device's cycle hint, or a random length). Runs never
/// overlap.
///
/// # Examples
///
/// ```
/// use nilm_engine::devices::SignatureCatalog;
/// use nilm_engine::synth::{HouseholdTrace, TraceSettings};
///
/// let settings = TraceSettings { hours: 1, ..TraceSettings::default() };
/// let trace: Vec<_> = HouseholdTrace::new(&SignatureCatalog::builtin(), settings).collect();
/// assert_eq!(trace.len(), 120);
/// ```
#[derive(Debug, Clone)]
pub struct HouseholdTrace {
    devices: Vec<DeviceSignature>,
    settings: TraceSettings,
    rng: StdRng,
    step: u64,
    total_steps: u64,
    phase: Phase,
}

impl HouseholdTrace {
    pub fn new(catalog: &SignatureCatalog, settings: TraceSettings) -> Self {
        let interval = u64::from(settings.interval_s.max(1));
        let total_steps = u64::from(settings.hours) * 3600 / interval;
        let mut trace = Self {
            devices: catalog.iter().cloned().collect(),
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            step: 0,
            total_steps,
            phase: Phase::Idle { remaining: 0 },
        };
        trace.phase = trace.idle_phase();
        trace
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    fn minutes_to_steps(&self, minutes: u32) -> u64 {
        let interval = u64::from(self.settings.interval_s.max(1));
        (u64::from(minutes) * 60 / interval).max(1)
    }

    fn random_minutes(&mut self, (lo, hi): (u32, u32)) -> u32 {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        self.rng.random_range(lo..=hi)
    }

    fn idle_phase(&mut self) -> Phase {
        let minutes = self.random_minutes(self.settings.idle_minutes);
        Phase::Idle {
            remaining: self.minutes_to_steps(minutes),
        }
    }

    fn run_phase(&mut self) -> Phase {
        if self.devices.is_empty() {
            return self.idle_phase();
        }
        let device = self.rng.random_range(0..self.devices.len());
        let sig = &self.devices[device];
        let margin = 0.1 * (sig.max_power - sig.min_power);
        let (lo, hi) = (sig.min_power + margin, sig.max_power - margin);
        let cycle = sig.cycle_time_hint;
        let watts = if hi > lo {
            self.rng.random_range(lo..=hi)
        } else {
            sig.min_power
        };
        let minutes = if cycle > 0 {
            cycle
        } else {
            self.random_minutes(self.settings.run_minutes)
        };
        Phase::Running {
            device,
            watts,
            remaining: self.minutes_to_steps(minutes),
        }
    }

    fn timestamp(&self, step: u64) -> DateTime<FixedOffset> {
        let offset = step.saturating_mul(u64::from(self.settings.interval_s));
        let secs = i64::try_from(offset).unwrap_or(i64::MAX);
        self.settings.start + TimeDelta::seconds(secs)
    }
}

impl Iterator for HouseholdTrace {
    type Item = SyntheticReading;

    fn next(&mut self) -> Option<Self::Item> {
        if self.step >= self.total_steps {
            return None;
        }

        let (exhausted, idle) = match self.phase {
            Phase::Idle { remaining } => (remaining == 0, true),
            Phase::Running { remaining, .. } => (remaining == 0, false),
        };
        if exhausted {
            self.phase = if idle {
                self.run_phase()
            } else {
                self.idle_phase()
            };
        }

        let (watts, truth) = match &mut self.phase {
            Phase::Idle { remaining } => {
                *remaining -= 1;
                let noise = gaussian_noise(&mut self.rng, self.settings.standby_noise_w);
                ((self.settings.standby_w + noise).max(0.0), None)
            }
            Phase::Running {
                device,
                watts,
                remaining,
            } => {
                *remaining -= 1;
                let sig = &self.devices[*device];
                // small ripple, kept inside the signature
                let ripple = gaussian_noise(&mut self.rng, 0.005 * *watts);
                (
                    (*watts + ripple).clamp(sig.min_power, sig.max_power),
                    Some(sig.name.clone()),
                )
            }
        };

        let sample = PowerSample::new(self.timestamp(self.step), watts);
        self.step += 1;
        Some(SyntheticReading { sample, truth })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.total_steps - self.step).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

/// Collects a whole trace.
pub fn generate(catalog: &SignatureCatalog, settings: TraceSettings) -> Vec<SyntheticReading> {
    HouseholdTrace::new(catalog, settings).collect()
}
