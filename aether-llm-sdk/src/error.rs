use thiserror::Error;

/// Error types for remote text generation
#[derive(Error, Debug)]
pub enum LlmError {
    /// Authentication failed (HTTP 401/403)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Invalid request parameters (HTTP 400)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// API error with status code (HTTP 4xx/5xx except above)
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Network or connection error
    #[error("Network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// JSON parsing or serialization error
    #[error("Parse error: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    /// Generic error for unexpected cases
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LlmError {
    /// Create an authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a rate limit error
    pub fn rate_limit<S: Into<String>>(message: S, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an API error
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Network failures, rate limits and server-side (5xx) errors are transient.
    /// Authentication, malformed requests and undecodable payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimit { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 408,
            Self::Authentication { .. }
            | Self::InvalidRequest { .. }
            | Self::Parse { .. }
            | Self::Internal { .. } => false,
        }
    }

    /// Server supplied retry hint in seconds, if any
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Map an HTTP error status to the matching error variant
    pub fn from_status(status: u16, message: String, retry_after: Option<u64>) -> Self {
        match status {
            400 => Self::invalid_request(message),
            401 | 403 => Self::authentication(message),
            413 => Self::invalid_request("Request too large"),
            429 => Self::rate_limit(message, retry_after),
            _ => Self::api_error(status, message),
        }
    }
}
