//! Error types.
//!
//! The capture path never returns these to the host page; they surface only
//! from the fallible edges: option parsing, page URLs, scenario scripts and
//! record serialization, whose failures the reporter logs and drops.

use thiserror::Error;

/// Errors produced by pagetrack.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid tracker options: {0}")]
    InvalidOptions(#[source] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scenario line {line}: {source}")]
    Scenario {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
