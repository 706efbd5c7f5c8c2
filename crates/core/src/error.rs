use thiserror::Error;

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture target not found: no element with id {element_id:?}")]
    TargetNotFound { element_id: String },

    #[error("Transport unavailable: connection is not open")]
    TransportUnavailable,

    #[error("Outbound queue full: {capacity} records waiting on the writer")]
    QueueFull { capacity: usize },

    #[error("Connection to collector lost: {0}")]
    ConnectionLost(String),

    #[error("Wire format error: {0}")]
    Wire(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for CaptureError {
    fn from(err: config::ConfigError) -> Self {
        CaptureError::Config(err.to_string())
    }
}
