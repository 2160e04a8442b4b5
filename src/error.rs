//! Typed error taxonomy for the connector layer
//!
//! Only transport-level faults are exceptional. Business rejections come back
//! as `Rejection` carrying the exchange's decoded error body so callers can
//! log and degrade instead of crashing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Connection error or timeout. The caller decides whether to retry;
    /// the transport layer never retries on its own.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx HTTP response with the decoded error body
    #[error("exchange rejected request (status {status}): {body}")]
    Rejection { status: u16, body: String },

    /// 2xx response whose body did not match the expected schema
    #[error("failed to decode exchange payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Signed call attempted without an API key pair configured
    #[error("API credentials not configured")]
    MissingCredentials,

    /// Failed to build the signed parameter string
    #[error("signing error: {0}")]
    Signing(String),

    /// Websocket-level fault; the stream task reconnects unless shutting down
    #[error("stream error: {0}")]
    Stream(String),
}

impl ExchangeError {
    /// Transport faults are the only class worth an immediate retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
