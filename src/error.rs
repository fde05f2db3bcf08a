//! Failure kinds surfaced by the data layer.
//!
//! Every failure ends up in `QueryEntry::error` once retries are exhausted.
//! A query that never ran because its parent has not succeeded is *not* an
//! error; it stays `Idle`.

use thiserror::Error;

use crate::constants::messages;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Non-2xx transport response.
    #[error("http {status} {status_text}")]
    Http { status: u16, status_text: String },

    /// HTTP 429. Same retry path as `Http`, only the messaging differs.
    #[error("rate limited (429 {status_text})")]
    RateLimit { status_text: String },

    /// `success: false` envelope from the server.
    #[error("{message}")]
    Api { message: String },

    /// Body matched none of the recognized envelopes or failed schema decoding.
    #[error("malformed response: {reason}")]
    Malformed { reason: String },

    /// Request never completed (offline, DNS, connect/read timeout).
    #[error("network error: {message}")]
    Network { message: String },
}

impl FetchError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        FetchError::Malformed {
            reason: reason.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        FetchError::Network {
            message: message.into(),
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, FetchError::RateLimit { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            FetchError::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Short text a screen shows next to its retry action.
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::RateLimit { .. } => messages::RATE_LIMITED,
            FetchError::Network { .. } => messages::OFFLINE,
            _ => messages::LOAD_FAILED,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::malformed(e.to_string())
        } else {
            FetchError::network(e.to_string())
        }
    }
}
