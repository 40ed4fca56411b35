//! Error types for the mini-agent client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Claude Code not found: {0}")]
    CliNotFound(String),

    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Not connected. Call connect() first.")]
    NotConnected,

    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    #[error("Message parse error: {0}")]
    MessageParse(String),

    #[error("Control request timeout: {0}")]
    ControlTimeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
