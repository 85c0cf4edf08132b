use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Missing required configuration value: {0}")]
    MissingConfig(String),

    #[error("Upstream request failed (status {status}): {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Upstream provider reported an error: {0}")]
    ProviderError(String),

    #[error("Invalid match tolerance {0}: must be greater than 0.0 and less than 1.0")]
    InvalidTolerance(f64),

    #[error("Invalid date range: from ({from}) is after to ({to})")]
    InvalidRange { from: String, to: String },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "pollers")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
