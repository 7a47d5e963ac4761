//! Crate-wide error type

use thiserror::Error;

/// The unified error type for the agent.
///
/// Network failures are retried where a retry budget exists (downloader);
/// everywhere else a failed attempt is logged and the next tick retries.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Transport-level failure talking to the cloud (DNS, TLS, timeout).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The cloud answered with a non-2xx status.
    #[error("api call failed: http {status} - {body}")]
    Api { status: u16, body: String },

    /// An upload was rejected; carries the response for the caller to log.
    #[error("upload failed: http {status} - {body}")]
    Upload { status: u16, body: String },

    /// A compressed container or tabular body could not be decoded.
    #[error("format error: {0}")]
    Format(String),

    /// Compressing a descriptor to its container form failed.
    #[error("compression failed: {0}")]
    Compression(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No valid access token and no way to mint one.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Expansion or second-pass inputs failed schema validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A required tag was absent from a descriptor.
    #[error("tag <{0}> not found")]
    TagNotFound(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
