use thiserror::Error;

/// Failure to turn an encoded configuration into an options document.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode base64 config: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded config is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by a routing engine through its capability traits.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the lifecycle controller, one variant per failure phase.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to create instance: {0}")]
    Construction(#[source] EngineError),

    #[error("failed to start instance: {0}")]
    Start(#[source] EngineError),

    #[error("instance not found: {0}")]
    NotFound(u64),

    #[error("failed to close instance {handle}: {source}")]
    Close {
        handle: u64,
        #[source]
        source: EngineError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LifecycleError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LifecycleError::NotFound(_))
    }
}
