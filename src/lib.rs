//! Non-intrusive load monitoring: infers which household appliances are
//! running from a single aggregate power-meter stream.

#[cfg(feature = "api")]
pub mod api;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
/// CSV replay and export.
pub mod io;
/// Disaggregation engine, sinks, and reporting.
pub mod nilm;
pub mod runner;
pub mod synth;
#[cfg(feature = "tui")]
pub mod tui;

pub use classifier::{ClassificationResult, Classifier, ClassifierSettings};
pub use error::{NilmError, Result};
pub use nilm::{DisaggregationEngine, EngineSettings, PowerSample, UpdateSink};
