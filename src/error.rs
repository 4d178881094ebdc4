use std::fmt;

use tokio_tungstenite::tungstenite;
use voice_session_utils::audio::CodecError;
use voice_session_utils::device::DeviceError;

/// Missing or malformed configuration. Connect never starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid endpoint request: {0}")]
    InvalidRequest(#[source] tungstenite::Error),
    #[error("failed to connect to endpoint: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("timed out connecting to endpoint")]
    Timeout,
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected yet")]
    NotConnected,
    #[error("outbound queue is full")]
    QueueFull,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed by the endpoint: {}", .0.as_deref().unwrap_or("no reason given"))]
    Closed(Option<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Coarse error classes surfaced to the UI layer, each with its own message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    DevicePermission,
    DeviceNotFound,
    DeviceUnsupported,
    DeviceUnavailable,
    Channel,
    Decode,
}

impl ErrorCategory {
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCategory::Config => "The voice session is not configured. Check that an API key is set.",
            ErrorCategory::DevicePermission => "Microphone access was denied. Allow microphone access and try again.",
            ErrorCategory::DeviceNotFound => "No microphone or speaker was found. Connect an audio device and try again.",
            ErrorCategory::DeviceUnsupported => "This audio device does not support live voice sessions.",
            ErrorCategory::DeviceUnavailable => "The audio device is busy or unavailable.",
            ErrorCategory::Channel => "Connection error. Please try again.",
            ErrorCategory::Decode => "Received audio could not be played.",
        }
    }
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::Device(DeviceError::PermissionDenied(_)) => ErrorCategory::DevicePermission,
            Error::Device(DeviceError::NotFound(_)) => ErrorCategory::DeviceNotFound,
            Error::Device(DeviceError::Unsupported(_)) => ErrorCategory::DeviceUnsupported,
            Error::Device(DeviceError::Unavailable(_)) => ErrorCategory::DeviceUnavailable,
            Error::Channel(_) => ErrorCategory::Channel,
            Error::Codec(_) => ErrorCategory::Decode,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            category: self.category(),
            message: self.category().user_message().to_string(),
            detail: self.to_string(),
        }
    }
}

/// The single error visible to the UI: a category, the message to show, and
/// the underlying cause for logs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ErrorReport {
    category: ErrorCategory,
    message: String,
    detail: String,
}

impl ErrorReport {
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.detail)
    }
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        err.report()
    }
}
