use thiserror::Error;

use crate::transport::ResponseError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to spawn language server `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Language server connection closed")]
    ConnectionClosed,

    #[error("Request `{0}` timed out")]
    Timeout(String),

    #[error("Language server returned an error: {0}")]
    Response(ResponseError),

    #[error("Invalid message from language server: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No language server session is running")]
    NotRunning,

    #[error("Language server failed to start: {0}")]
    StartFailed(String),
}
