use thiserror::Error;

/// The reasoning service could not produce usable text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("request to {provider} failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} returned {status}: {message}")]
    Status {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} returned no usable output: {reason}")]
    NoCandidate { provider: String, reason: String },
}

/// Raw service output that does not have the required analysis shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedResponseError {
    #[error("response is not valid JSON: {0}")]
    Parse(String),

    #[error("response is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("response has an unrecognized severity `{0}`")]
    UnknownSeverity(String),
}

/// Precondition failures surfaced to the caller before any network activity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error("error text must not be empty")]
    EmptyErrorText,
}
