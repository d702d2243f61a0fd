//! Error types for the traffic generator.

use thiserror::Error;

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;

/// Primary error type for scenario configuration and aggregation.
///
/// Request-level failures (network errors, timeouts, non-2xx responses) are
/// not represented here: they are recorded as failure samples and surface
/// through the failure rate in the final report.
#[derive(Debug, Error)]
pub enum BenchError {
    // === Configuration Errors ===
    #[error("Missing base URL for backend '{backend}' (set it in the scenario or via the {env} environment variable)")]
    MissingEndpoint { backend: String, env: String },

    #[error("Invalid category weights: {0}")]
    InvalidWeights(String),

    #[error("Route space for '{category}' must be at least 1")]
    EmptyRouteSpace { category: &'static str },

    #[error("Invalid value for '{field}': {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },

    // === Aggregation Errors ===
    #[error("Aggregation invariant violated: {0}")]
    Aggregation(String),
}
