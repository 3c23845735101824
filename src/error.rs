//! Crate-level error type.
//!
//! Every fallible library function returns [`ChatError`]. The subscriber treats
//! all transport variants the same way (retry with backoff); the distinction
//! only matters for log fields and for the server's HTTP status codes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A connection to the endpoint could not be established.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The remote server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The response opened but did not carry `text/event-stream`.
    #[error("{url} is not an event stream (content-type: {content_type})")]
    NotEventStream { url: String, content_type: String },

    /// The stream failed after it was opened.
    #[error("stream error: {0}")]
    Stream(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// A submitted message failed form decoding or field validation.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ChatError {
    /// Short stable label (snake_case) for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChatError::Io(_) => "io",
            ChatError::Json(_) => "json",
            ChatError::Toml(_) => "toml",
            ChatError::Connect { .. } => "connect",
            ChatError::Http { .. } => "http_status",
            ChatError::NotEventStream { .. } => "not_event_stream",
            ChatError::Stream(_) => "stream",
            ChatError::BadRequest(_) => "bad_request",
            ChatError::InvalidMessage(_) => "invalid_message",
        }
    }
}
