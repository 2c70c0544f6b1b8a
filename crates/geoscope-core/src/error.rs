use serde::Serialize;
use thiserror::Error;

/// Request-level failures. Adapter failures never surface here; they are
/// absorbed into the limitations list.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("could not geocode address '{address}': {reason}")]
    GeocodingFailed { address: String, reason: String },

    #[error("rate limit exceeded; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("report generation did not complete within {steps} model steps")]
    StepBoundExceeded { steps: usize },

    #[error("model protocol error: {0}")]
    ModelProtocol(String),

    #[error("model provider error: {0}")]
    ModelProvider(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Client,
    Unprocessable,
    RateLimited,
    Server,
    Upstream,
}

impl ErrorClass {
    /// HTTP-equivalent status for the class.
    pub fn status(&self) -> u16 {
        match self {
            ErrorClass::Client => 400,
            ErrorClass::Unprocessable => 422,
            ErrorClass::RateLimited => 429,
            ErrorClass::Server => 500,
            ErrorClass::Upstream => 502,
        }
    }
}

impl ReportError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReportError::InvalidInput(_) => ErrorClass::Client,
            ReportError::GeocodingFailed { .. } => ErrorClass::Unprocessable,
            ReportError::RateLimited { .. } => ErrorClass::RateLimited,
            ReportError::StepBoundExceeded { .. } => ErrorClass::Server,
            ReportError::ModelProtocol(_) | ReportError::ModelProvider(_) => ErrorClass::Upstream,
        }
    }
}
