//! CSV input and output.

pub mod export;
/// Replay of recorded meter readings.
pub mod replay;
