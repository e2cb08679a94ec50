//! Error types shared across the engine.

use thiserror::Error;

/// A power reading the engine refuses to process.
///
/// The sample is dropped and engine state is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    /// The reading could not be coerced to a number.
    #[error("power reading {raw:?} is not numeric")]
    NotNumeric { raw: String },

    /// The reading is NaN or infinite.
    #[error("power reading {watts} is not finite")]
    NotFinite { watts: f64 },

    /// The reading is below zero.
    #[error("power reading {watts} W is negative")]
    Negative { watts: f64 },
}

/// Failure inside the classifier. The engine treats every variant as
/// "no device active" for the current cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassificationError {
    /// `classify` was called before any successful `fit`.
    #[error("classifier has no trained model")]
    ModelUnavailable,

    /// Classifier settings are out of range.
    #[error("invalid classifier settings: {0}")]
    InvalidSettings(String),

    /// Training input was rejected.
    #[error("training failed: {0}")]
    Training(String),

    /// A non-finite intermediate value was produced.
    #[error("numeric fault while classifying {watts} W: {detail}")]
    Numeric { watts: f64, detail: String },
}

/// Invalid signature catalog.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("catalog contains no signatures")]
    Empty,

    #[error("duplicate device name \"{0}\"")]
    Duplicate(String),

    #[error("device \"{name}\": {message}")]
    InvalidSignature { name: String, message: String },

    #[error("unknown device \"{0}\"")]
    UnknownDevice(String),
}

/// Umbrella error for host code wiring the engine together.
#[derive(Debug, Error)]
pub enum NilmError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result alias for host-level operations.
pub type Result<T> = std::result::Result<T, NilmError>;
