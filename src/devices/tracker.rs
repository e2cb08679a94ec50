//! Per-device ON/OFF state machine with smoothing and energy accounting.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use tracing::{debug, warn};

use super::signature::DeviceSignature;
use super::types::{DeviceRecord, DeviceSnapshot, DeviceState, confidence_percent};

/// Number of raw attributions averaged into `smoothed_power`.
pub const SMOOTHING_WINDOW: usize = 5;

const SECONDS_PER_KWH_PER_WATT: f64 = 3_600_000.0;

/// Tracks one appliance across the lifetime of an engine.
///
/// Every processed sample drives exactly one [`update`](Self::update): the
/// attributed device receives the classified power, every other device
/// receives `0.0`. The tracker then:
///
/// - keeps the last [`SMOOTHING_WINDOW`] raw attributions and reports their mean
/// - switches ON when the attribution exceeds the on-threshold and OFF otherwise
/// - accrues runtime and energy for the elapsed wall time while ON
/// - zeroes the daily energy total at local midnight
///
/// # Examples
///
/// ```
/// use chrono::{FixedOffset, TimeZone};
/// use nilm_engine::devices::{DeviceSignature, DeviceStateTracker};
///
/// let tz = FixedOffset::east_opt(0).unwrap();
/// let mut fridge = DeviceStateTracker::new(
///     DeviceSignature::new("refrigerator", 40.0, 100.0, 30),
///     10.0,
/// );
///
/// fridge.update(60.0, 0.9, tz.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
/// let snap = fridge.update(60.0, 0.9, tz.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
/// assert!(snap.is_on);
/// assert!((snap.daily_energy_kwh - 0.06).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct DeviceStateTracker {
    signature: DeviceSignature,
    on_threshold_w: f64,
    state: DeviceState,
    recent_power: VecDeque<f64>,
    smoothed_power: f64,
    cumulative_runtime: Duration,
    daily_energy_kwh: f64,
    confidence: f64,
    last_update: Option<DateTime<FixedOffset>>,
    last_reset_date: Option<NaiveDate>,
    activations: u64,
}

impl DeviceStateTracker {
    /// Creates an OFF tracker for `signature`.
    ///
    /// The on-threshold is the signature's `min_power`, or `min_power_floor_w`
    /// when the signature does not specify one (`min_power == 0`).
    pub fn new(signature: DeviceSignature, min_power_floor_w: f64) -> Self {
        let on_threshold_w = if signature.min_power > 0.0 {
            signature.min_power
        } else {
            min_power_floor_w.max(0.0)
        };
        Self {
            signature,
            on_threshold_w,
            state: DeviceState::Off,
            recent_power: VecDeque::with_capacity(SMOOTHING_WINDOW),
            smoothed_power: 0.0,
            cumulative_runtime: Duration::ZERO,
            daily_energy_kwh: 0.0,
            confidence: 0.0,
            last_update: None,
            last_reset_date: None,
            activations: 0,
        }
    }

    /// Applies one attribution cycle and returns the resulting snapshot.
    ///
    /// A timestamp earlier than the previous update is tolerated: no runtime
    /// or energy accrues for this call, but the ON/OFF transition still
    /// follows `attributed_power`.
    pub fn update(
        &mut self,
        attributed_power: f64,
        confidence: f64,
        timestamp: DateTime<FixedOffset>,
    ) -> DeviceSnapshot {
        let power = if attributed_power.is_finite() {
            attributed_power.max(0.0)
        } else {
            0.0
        };

        // smoothing window
        if self.recent_power.len() == SMOOTHING_WINDOW {
            self.recent_power.pop_front();
        }
        self.recent_power.push_back(power);
        self.smoothed_power =
            self.recent_power.iter().sum::<f64>() / self.recent_power.len() as f64;

        // confidence
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        // elapsed wall time, clamped at zero
        let elapsed = match self.last_update {
            Some(prev) => {
                let delta = timestamp - prev;
                if delta < chrono::TimeDelta::zero() {
                    warn!(
                        device = %self.signature.name,
                        previous = %prev,
                        current = %timestamp,
                        "clock regression, skipping accrual"
                    );
                }
                delta.to_std().unwrap_or(Duration::ZERO)
            }
            None => Duration::ZERO,
        };

        // state machine
        let next = if power > self.on_threshold_w {
            DeviceState::On
        } else {
            DeviceState::Off
        };
        if next != self.state {
            if next.is_on() {
                self.activations += 1;
            }
            debug!(
                device = %self.signature.name,
                from = %self.state,
                to = %next,
                power_w = power,
                "state transition"
            );
            self.state = next;
        }

        // day boundary, evaluated before accrual
        let today = timestamp.date_naive();
        let crossed_midnight = match self.last_reset_date {
            Some(date) => today > date,
            None => {
                self.last_reset_date = Some(today);
                false
            }
        };
        if crossed_midnight {
            self.daily_energy_kwh = 0.0;
            self.last_reset_date = Some(today);
        }
        // the interval may start before midnight even when today's reset
        // already happened (an earlier reading regressed across it)
        let spans_midnight = self
            .last_update
            .is_some_and(|prev| prev.date_naive() < today);

        // accrual while ON
        if self.state.is_on() && !elapsed.is_zero() {
            self.cumulative_runtime += elapsed;
            let mut energy_secs = elapsed.as_secs_f64();
            if spans_midnight {
                energy_secs = energy_secs.min(seconds_since_midnight(&timestamp));
            }
            self.daily_energy_kwh += power * energy_secs / SECONDS_PER_KWH_PER_WATT;
        }

        self.last_update = Some(timestamp);
        self.snapshot_at(timestamp)
    }

    fn snapshot_at(&self, timestamp: DateTime<FixedOffset>) -> DeviceSnapshot {
        DeviceSnapshot {
            device_name: self.signature.name.clone(),
            is_on: self.state.is_on(),
            current_power_watts: self.smoothed_power,
            cumulative_runtime_seconds: self.cumulative_runtime.as_secs_f64(),
            daily_energy_kwh: self.daily_energy_kwh,
            confidence_percent: confidence_percent(self.confidence),
            last_update: timestamp,
        }
    }

    /// Current snapshot, or `None` before the first update.
    pub fn snapshot(&self) -> Option<DeviceSnapshot> {
        self.last_update.map(|ts| self.snapshot_at(ts))
    }

    /// Exports the durable part of the state.
    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            name: self.signature.name.clone(),
            cumulative_runtime_seconds: self.cumulative_runtime.as_secs_f64(),
            daily_energy_kwh: self.daily_energy_kwh,
            last_reset_date: self.last_reset_date,
        }
    }

    /// Loads runtime and energy totals from a durable record.
    ///
    /// Negative or non-finite totals are treated as zero.
    pub fn restore(&mut self, record: &DeviceRecord) {
        let runtime = record.cumulative_runtime_seconds;
        self.cumulative_runtime = if runtime.is_finite() && runtime > 0.0 {
            Duration::from_secs_f64(runtime)
        } else {
            Duration::ZERO
        };
        let energy = record.daily_energy_kwh;
        self.daily_energy_kwh = if energy.is_finite() { energy.max(0.0) } else { 0.0 };
        self.last_reset_date = record.last_reset_date;
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn signature(&self) -> &DeviceSignature {
        &self.signature
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn on_threshold_w(&self) -> f64 {
        self.on_threshold_w
    }

    pub fn smoothed_power(&self) -> f64 {
        self.smoothed_power
    }

    /// Raw attributions currently in the smoothing window, oldest first.
    pub fn recent_power(&self) -> impl Iterator<Item = f64> + '_ {
        self.recent_power.iter().copied()
    }

    pub fn cumulative_runtime(&self) -> Duration {
        self.cumulative_runtime
    }

    pub fn daily_energy_kwh(&self) -> f64 {
        self.daily_energy_kwh
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn last_update(&self) -> Option<DateTime<FixedOffset>> {
        self.last_update
    }

    pub fn last_reset_date(&self) -> Option<NaiveDate> {
        self.last_reset_date
    }

    /// Number of OFF→ON transitions observed.
    pub fn activations(&self) -> u64 {
        self.activations
    }
}

fn seconds_since_midnight(timestamp: &DateTime<FixedOffset>) -> f64 {
    let time = timestamp.time();
    f64::from(time.num_seconds_from_midnight()) + f64::from(time.nanosecond()) * 1e-9
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, day, h, m, s)
            .unwrap()
    }

    fn fridge() -> DeviceStateTracker {
        DeviceStateTracker::new(DeviceSignature::new("refrigerator", 40.0, 100.0, 30), 10.0)
    }

    #[test]
    fn starts_off_with_zeroed_totals() {
        let t = fridge();
        assert_eq!(t.state(), DeviceState::Off);
        assert_eq!(t.daily_energy_kwh(), 0.0);
        assert_eq!(t.cumulative_runtime(), Duration::ZERO);
        assert!(t.snapshot().is_none());
    }

    #[test]
    fn smoothing_is_mean_of_last_five() {
        let mut t = fridge();
        for (i, w) in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0].iter().enumerate() {
            t.update(*w, 1.0, at(1, 0, 0, i as u32));
        }
        let window: Vec<f64> = t.recent_power().collect();
        assert_eq!(window, vec![30.0, 40.0, 50.0, 60.0, 70.0]);
        assert!((t.smoothed_power() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn off_updates_are_idempotent() {
        let mut t = fridge();
        t.update(60.0, 0.9, at(1, 8, 0, 0));
        t.update(60.0, 0.9, at(1, 8, 0, 10));
        t.update(0.0, 0.0, at(1, 8, 0, 20));
        let energy = t.daily_energy_kwh();
        let runtime = t.cumulative_runtime();
        for s in 21..30 {
            t.update(0.0, 0.0, at(1, 8, 0, s));
            assert_eq!(t.daily_energy_kwh(), energy);
            assert_eq!(t.cumulative_runtime(), runtime);
            assert_eq!(t.state(), DeviceState::Off);
        }
    }

    #[test]
    fn energy_strictly_increases_while_on() {
        let mut t = fridge();
        t.update(75.0, 0.8, at(1, 12, 0, 0));
        let mut last = t.daily_energy_kwh();
        for s in 1..20 {
            t.update(75.0, 0.8, at(1, 12, 0, s));
            assert!(t.daily_energy_kwh() > last);
            last = t.daily_energy_kwh();
        }
        assert_eq!(t.cumulative_runtime(), Duration::from_secs(19));
    }

    #[test]
    fn day_boundary_keeps_only_post_midnight_energy() {
        let mut t = fridge();
        t.update(90.0, 1.0, at(1, 22, 0, 0));
        t.update(90.0, 1.0, at(1, 23, 59, 59));
        assert!(t.daily_energy_kwh() > 0.17);

        t.update(90.0, 1.0, at(2, 0, 0, 1));
        let expected = 90.0 * 1.0 / 3_600_000.0;
        assert!((t.daily_energy_kwh() - expected).abs() < 1e-12);
        assert_eq!(t.last_reset_date(), NaiveDate::from_ymd_opt(2024, 3, 2));
        // runtime keeps the full two seconds across midnight
        assert_eq!(
            t.cumulative_runtime(),
            Duration::from_secs(2 * 3600 - 1 + 2)
        );
    }

    #[test]
    fn regression_across_midnight_still_clamps_to_new_day() {
        let mut t = fridge();
        t.update(60.0, 1.0, at(1, 23, 59, 50));
        t.update(60.0, 1.0, at(2, 0, 0, 1));
        // back to the previous day, then forward again
        t.update(60.0, 1.0, at(1, 23, 59, 59));
        t.update(60.0, 1.0, at(2, 0, 0, 5));

        // one second after the reset plus five after the regression
        let expected = 60.0 * 6.0 / 3_600_000.0;
        assert!((t.daily_energy_kwh() - expected).abs() < 1e-12);
        assert_eq!(t.last_reset_date(), NaiveDate::from_ymd_opt(2024, 3, 2));
        assert_eq!(t.cumulative_runtime(), Duration::from_secs(11 + 6));
    }

    #[test]
    fn day_boundary_resets_even_when_off() {
        let mut t = fridge();
        t.update(90.0, 1.0, at(1, 10, 0, 0));
        t.update(90.0, 1.0, at(1, 11, 0, 0));
        t.update(0.0, 0.0, at(1, 12, 0, 0));
        assert!(t.daily_energy_kwh() > 0.0);
        t.update(0.0, 0.0, at(2, 1, 0, 0));
        assert_eq!(t.daily_energy_kwh(), 0.0);
    }

    #[test]
    fn clock_regression_skips_accrual_but_transitions() {
        let mut t = fridge();
        t.update(80.0, 1.0, at(1, 9, 0, 10));
        t.update(80.0, 1.0, at(1, 9, 0, 20));
        let energy = t.daily_energy_kwh();
        let runtime = t.cumulative_runtime();

        let snap = t.update(0.0, 0.0, at(1, 9, 0, 5));
        assert!(!snap.is_on);
        assert_eq!(t.daily_energy_kwh(), energy);
        assert_eq!(t.cumulative_runtime(), runtime);

        let snap = t.update(80.0, 1.0, at(1, 9, 0, 1));
        assert!(snap.is_on);
        assert_eq!(t.daily_energy_kwh(), energy);
    }

    #[test]
    fn power_at_threshold_is_off() {
        let mut t = fridge();
        assert!(!t.update(40.0, 1.0, at(1, 0, 0, 0)).is_on);
        assert!(t.update(40.5, 1.0, at(1, 0, 0, 1)).is_on);
        assert!(!t.update(5.0, 1.0, at(1, 0, 0, 2)).is_on);
        assert_eq!(t.activations(), 1);
    }

    #[test]
    fn zero_min_power_falls_back_to_floor() {
        let t = DeviceStateTracker::new(DeviceSignature::new("standby", 0.0, 5.0, 0), 10.0);
        assert_eq!(t.on_threshold_w(), 10.0);
        assert_eq!(fridge().on_threshold_w(), 40.0);
    }

    #[test]
    fn confidence_is_clamped_and_reported_as_percent() {
        let mut t = fridge();
        let snap = t.update(60.0, 0.8765, at(1, 0, 0, 0));
        assert_eq!(snap.confidence_percent, 87.7);
        t.update(60.0, 3.0, at(1, 0, 0, 1));
        assert_eq!(t.confidence(), 1.0);
        t.update(60.0, f64::NAN, at(1, 0, 0, 2));
        assert_eq!(t.confidence(), 0.0);
    }

    #[test]
    fn record_round_trips_through_restore() {
        let mut t = fridge();
        t.update(60.0, 1.0, at(1, 6, 0, 0));
        t.update(60.0, 1.0, at(1, 7, 0, 0));
        let record = t.record();
        assert_eq!(record.cumulative_runtime_seconds, 3600.0);

        let mut fresh = fridge();
        fresh.restore(&record);
        assert_eq!(fresh.cumulative_runtime(), Duration::from_secs(3600));
        assert_eq!(fresh.daily_energy_kwh(), t.daily_energy_kwh());

        // a restored total from yesterday is dropped on the first update today
        fresh.update(0.0, 0.0, at(2, 6, 0, 0));
        assert_eq!(fresh.daily_energy_kwh(), 0.0);
        assert_eq!(fresh.cumulative_runtime(), Duration::from_secs(3600));
    }
}
