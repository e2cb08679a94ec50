//! Appliance signatures and per-device state tracking.

/// Device power signatures and the signature catalog.
pub mod signature;
/// Per-device ON/OFF state machine.
pub mod tracker;
pub mod types;

// Re-export the main types for convenience
pub use signature::{DeviceSignature, LabeledSample, SignatureCatalog};
pub use tracker::{DeviceStateTracker, SMOOTHING_WINDOW};
pub use types::{DeviceRecord, DeviceSnapshot, DeviceState, confidence_percent};
