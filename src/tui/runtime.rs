//! Trace replay loop and TUI application state.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::devices::DeviceStateTracker;
use crate::error::Result;
use crate::nilm::{AccuracyTally, DisaggregationEngine, LatestSink};
use crate::synth::HouseholdTrace;

/// Maximum number of history entries kept for the rolling chart.
const MAX_HISTORY: usize = 240;

/// Tick interval options in milliseconds (slowest → fastest).
const SPEED_LEVELS_MS: [u64; 6] = [500, 250, 100, 50, 20, 5];

/// Default speed index (100 ms).
const DEFAULT_SPEED_IDX: usize = 2;

/// One processed reading as shown on the chart.
#[derive(Debug, Clone)]
pub struct TickRecord {
    pub step: u64,
    pub aggregate_w: f64,
    /// Device the engine attributed the reading to.
    pub attributed: Option<String>,
    pub confidence: f64,
    /// Device actually running in the synthetic trace.
    pub truth: Option<String>,
}

/// TUI application state.
pub struct App {
    engine: DisaggregationEngine<LatestSink>,
    trace: HouseholdTrace,
    /// Base configuration, kept so preset switches inherit trace overrides.
    base: EngineConfig,
    /// Rolling history for the chart.
    pub history: VecDeque<TickRecord>,
    pub tally: AccuracyTally,
    /// Next sample index.
    pub timestep: u64,
    pub total_steps: u64,
    pub paused: bool,
    /// Current index into `SPEED_LEVELS_MS`.
    pub speed_idx: usize,
    pub quit: bool,
    /// When the last tick was executed.
    pub last_tick: Instant,
    /// Name of the active preset.
    pub preset_name: String,
    /// Hide devices that are OFF in the device table.
    pub show_on_only: bool,
    /// Outcome of the last operator command, shown in the status panel.
    pub status: Option<String>,
}

fn build(config: &EngineConfig) -> Result<(DisaggregationEngine<LatestSink>, HouseholdTrace)> {
    let catalog = config.catalog()?;
    let trace = HouseholdTrace::new(&catalog, config.trace_settings());
    let engine = DisaggregationEngine::new(catalog, config.engine_settings(), LatestSink::new())?;
    Ok((engine, trace))
}

impl App {
    /// Creates the app for an already validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or bootstrap training is invalid.
    pub fn new(config: EngineConfig, preset: &str) -> Result<Self> {
        let (engine, trace) = build(&config)?;
        Ok(Self {
            total_steps: trace.total_steps(),
            engine,
            trace,
            base: config,
            history: VecDeque::with_capacity(MAX_HISTORY),
            tally: AccuracyTally::default(),
            timestep: 0,
            paused: false,
            speed_idx: DEFAULT_SPEED_IDX,
            quit: false,
            last_tick: Instant::now(),
            preset_name: preset.to_string(),
            show_on_only: false,
            status: None,
        })
    }

    /// Processes the next reading of the trace, if any.
    pub fn tick(&mut self) {
        let Some(reading) = self.trace.next() else {
            return;
        };
        // synthetic readings are always valid
        let Ok(result) = self.engine.process(&reading.sample) else {
            return;
        };
        self.tally
            .record(result.device_name.as_deref(), reading.truth.as_deref());
        if self.history.len() >= MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(TickRecord {
            step: self.timestep,
            aggregate_w: reading.sample.watts,
            attributed: result.device_name,
            confidence: result.confidence,
            truth: reading.truth,
        });
        self.timestep += 1;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Increases replay speed (shorter tick interval).
    pub fn speed_up(&mut self) {
        if self.speed_idx + 1 < SPEED_LEVELS_MS.len() {
            self.speed_idx += 1;
        }
    }

    /// Decreases replay speed (longer tick interval).
    pub fn speed_down(&mut self) {
        if self.speed_idx > 0 {
            self.speed_idx -= 1;
        }
    }

    pub fn tick_interval_ms(&self) -> u64 {
        SPEED_LEVELS_MS[self.speed_idx]
    }

    /// Switches to a different preset, resetting all state. The trace
    /// length and seed of the launch configuration are kept.
    pub fn switch_preset(&mut self, name: &str) {
        let Ok(mut config) = EngineConfig::from_preset(name) else {
            return;
        };
        config.trace = self.base.trace.clone();
        if !config.validate().is_empty() {
            return;
        }
        let Ok((engine, trace)) = build(&config) else {
            return;
        };
        self.engine = engine;
        self.total_steps = trace.total_steps();
        self.trace = trace;
        self.history.clear();
        self.tally = AccuracyTally::default();
        self.timestep = 0;
        self.paused = false;
        self.preset_name = name.to_string();
        self.status = Some(format!("switched to {name}"));
    }

    /// Restarts the current configuration from the beginning.
    pub fn restart(&mut self) {
        let Ok((engine, trace)) = build(&self.active_config()) else {
            return;
        };
        self.engine = engine;
        self.trace = trace;
        self.history.clear();
        self.tally = AccuracyTally::default();
        self.timestep = 0;
        self.paused = false;
        self.status = None;
    }

    /// Refits the classifier on the engine's current training set.
    pub fn retrain(&mut self) {
        let samples = self.engine.training_set().len();
        self.status = Some(match self.engine.retrain() {
            Ok(()) => format!(
                "retrained on {samples} samples (model #{})",
                self.model_generation()
            ),
            Err(e) => format!("retrain failed: {e}"),
        });
    }

    /// Generation of the active classifier model, 0 when untrained.
    pub fn model_generation(&self) -> u64 {
        self.engine
            .classifier()
            .model()
            .map_or(0, |m| m.generation())
    }

    fn active_config(&self) -> EngineConfig {
        if self.preset_name == "custom" {
            return self.base.clone();
        }
        match EngineConfig::from_preset(&self.preset_name) {
            Ok(mut config) => {
                config.trace = self.base.trace.clone();
                config
            }
            Err(_) => self.base.clone(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.timestep >= self.total_steps
    }

    pub fn last_record(&self) -> Option<&TickRecord> {
        self.history.back()
    }

    pub fn trackers(&self) -> &[DeviceStateTracker] {
        self.engine.trackers()
    }

    /// Trackers shown in the device table under the current filter.
    pub fn visible_trackers(&self) -> impl Iterator<Item = &DeviceStateTracker> {
        let on_only = self.show_on_only;
        self.trackers()
            .iter()
            .filter(move |t| !on_only || t.state().is_on())
    }

    /// Share of readings attributed to some device (%).
    pub fn coverage_pct(&self) -> f64 {
        let stats = self.engine.stats();
        if stats.samples_processed == 0 {
            0.0
        } else {
            100.0 * stats.attributed() as f64 / stats.samples_processed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(preset: &str) -> App {
        let mut config = EngineConfig::from_preset(preset).unwrap();
        config.trace.hours = 1;
        App::new(config, preset).unwrap()
    }

    #[test]
    fn app_creates_and_ticks() {
        let mut app = short("default");
        assert_eq!(app.timestep, 0);
        assert!(!app.is_finished());
        assert_eq!(app.trackers().len(), 9);

        app.tick();
        assert_eq!(app.timestep, 1);
        assert_eq!(app.history.len(), 1);
        assert_eq!(app.tally.total, 1);
    }

    #[test]
    fn app_finishes_after_total_steps() {
        let mut app = short("default");
        for _ in 0..app.total_steps {
            app.tick();
        }
        assert!(app.is_finished());
        let before = app.timestep;
        app.tick();
        assert_eq!(app.timestep, before);
        assert!(app.history.len() <= MAX_HISTORY);
    }

    #[test]
    fn speed_controls_stay_in_bounds() {
        let mut app = short("default");
        for _ in 0..10 {
            app.speed_down();
        }
        assert_eq!(app.speed_idx, 0);
        for _ in 0..10 {
            app.speed_up();
        }
        assert_eq!(app.speed_idx, SPEED_LEVELS_MS.len() - 1);
    }

    #[test]
    fn switch_preset_resets_state_and_keeps_trace_length() {
        let mut app = short("default");
        app.tick();
        app.tick();
        app.switch_preset("essentials");
        assert_eq!(app.timestep, 0);
        assert!(app.history.is_empty());
        assert_eq!(app.preset_name, "essentials");
        assert_eq!(app.trackers().len(), 5);
        assert_eq!(app.total_steps, 120);

        app.switch_preset("bogus");
        assert_eq!(app.preset_name, "essentials");
    }

    #[test]
    fn restart_resets_state() {
        let mut app = short("sensitive");
        for _ in 0..5 {
            app.tick();
        }
        app.restart();
        assert_eq!(app.timestep, 0);
        assert!(app.history.is_empty());
        assert_eq!(app.preset_name, "sensitive");
        assert_eq!(app.coverage_pct(), 0.0);
    }
}
