use thiserror::Error;

/// Failures talking to the story service over HTTP.
///
/// Reading operations never hand these to callers; they are logged and turned
/// into fallback content. `bootstrap` and the world client surface them.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP error! status: {status} ({url})")]
    Status { status: u16, url: String },
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// True when the service could not be reached at all, as opposed to
    /// answering with an error.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

/// Failures on the real-time world channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection is not open")]
    NotOpen,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL {0:?}: must start with http:// or https://")]
    InvalidBaseUrl(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
