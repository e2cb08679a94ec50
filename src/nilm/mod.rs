//! Disaggregation pipeline: sample validation, routing, sinks, and reporting.

pub mod engine;
pub mod report;
/// Power readings and input coercion.
pub mod sample;
/// Snapshot consumers.
pub mod sink;

pub use engine::{DisaggregationEngine, EngineSettings, EngineStats};
pub use report::{AccuracyTally, DeviceSummary, RunReport};
pub use sample::PowerSample;
pub use sink::{LatestSink, LogSink, NullSink, UpdateSink, VecSink};
