//! Error types for the confluence engine

use thiserror::Error;

use crate::risk::RiskRejection;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the confluence engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Analysis errors
    #[error("Insufficient data: need {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Data boundary errors
    #[error("Candle data error: {0}")]
    Data(String),

    // Ledger errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Ledger persistence failed: {0}")]
    Persistence(String),

    #[error("Trade rejected: {0}")]
    RiskRejected(RiskRejection),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Data(_) | Error::Io(_))
    }

    /// Check if this error is a risk gate rejection
    pub fn is_risk_rejection(&self) -> bool {
        matches!(self, Error::RiskRejected(_))
    }

    /// Check if this error only means "not enough candles yet"
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Error::InsufficientData { .. })
    }
}

impl From<RiskRejection> for Error {
    fn from(r: RiskRejection) -> Self {
        Error::RiskRejected(r)
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
