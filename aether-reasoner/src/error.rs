use thiserror::Error;

/// Conditions that abort a reasoning call.
///
/// Everything else (unparseable replies, validation problems) is reported
/// inside the returned [`crate::output::ReasonerOutput`].
#[derive(Error, Debug)]
pub enum ReasonerError {
    /// Malformed or missing schema snapshot
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// The text generation service could not be reached within the retry budget
    #[error("Reasoning unavailable after {attempts} attempt(s): {message}")]
    ReasoningUnavailable { attempts: u32, message: String },

    /// Invalid configuration, raised at startup
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ReasonerError {
    pub fn schema<S: Into<String>>(message: S) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(attempts: u32, message: S) -> Self {
        Self::ReasoningUnavailable {
            attempts,
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReasonerError>;
