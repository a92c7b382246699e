//! Unified error types for citeflow.
//!
//! Every variant that can reach a consumer is rendered as notice text in a
//! chunk or response; nothing here is allowed to escape as a panic while a
//! stream is in flight.

use crate::store::StoreError;

/// Unified error taxonomy for the query pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No provider credential is available.
    #[error("provider not configured: set CITEFLOW_API_KEY to enable queries")]
    NotConfigured,

    /// The daily call allowance is exhausted.
    #[error("daily limit reached: {used} of {limit} calls used today, try again tomorrow")]
    QuotaExceeded { used: u32, limit: u32 },

    /// Network or provider failure during a call.
    #[error("transport error: {0}")]
    Transport(String),

    /// Underlying key-value store failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Invalid input parameters (e.g. empty query).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_display() {
        let err = Error::QuotaExceeded { used: 20, limit: 20 };
        assert!(err.to_string().contains("20 of 20"));
        assert!(err.to_string().contains("daily limit"));
    }

    #[test]
    fn test_not_configured_display() {
        let err = Error::NotConfigured;
        assert!(err.to_string().contains("CITEFLOW_API_KEY"));
    }

    #[test]
    fn test_persistence_from_store_error() {
        let err: Error = StoreError::QuotaExceeded { attempted: 10, budget: 5 }.into();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
