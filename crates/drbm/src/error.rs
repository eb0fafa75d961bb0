//! Error taxonomy for model construction, persistence, and dataset I/O.
//!
//! Numeric failures (NaN/inf from a zero true-class probability or a
//! zero denominator in the KL estimate) are deliberately absent: they
//! travel as tensor values and are left for the caller to judge.

/// Errors raised by the DRBM library.
#[derive(Debug, thiserror::Error)]
pub enum DrbmError {
    /// Activation name not present in the marginalization registry.
    #[error("unknown activation policy: {0:?}")]
    UnknownActivation(String),

    /// Declared dtype tag disagrees with the backend's float element.
    #[error("dtype mismatch: record declares {declared:?}, backend uses {backend:?}")]
    DtypeMismatch { declared: String, backend: String },

    /// A parameter array does not match the declared topology.
    #[error("shape mismatch for {param}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        param: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A training or experiment setting outside its valid range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Structurally valid JSON whose contents are inconsistent.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Record or dataset file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Record or dataset file is not valid JSON for the expected layout.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
