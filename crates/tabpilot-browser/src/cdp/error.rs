//! CDP failures and their mapping onto platform errors.

use thiserror::Error;

use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum CdpError {
    /// Nothing answered on the debugging endpoint.
    #[error("No browser debugging endpoint at {0} (start Chrome with --remote-debugging-port=9222)")]
    ChromeNotAvailable(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The browser socket closed while a call was outstanding.
    #[error("Browser connection closed")]
    SessionClosed,

    #[error("Browser rejected the call: {message} (code {code})")]
    Protocol { code: i64, message: String },

    #[error("Call timed out: {0}")]
    Timeout(String),

    /// An exception thrown by evaluated page code.
    #[error("Page script threw: {0}")]
    JavaScript(String),

    #[error("Unexpected browser reply: {0}")]
    InvalidResponse(String),

    #[error("Could not encode or decode message: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::ConnectionFailed(e.to_string())
    }
}

/// Socket-level failures become `Connection` so the classifier retries them;
/// everything else is a plain backend failure.
impl From<CdpError> for PlatformError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::ChromeNotAvailable(_)
            | CdpError::ConnectionFailed(_)
            | CdpError::SessionClosed => PlatformError::Connection(e.to_string()),
            _ => PlatformError::Backend(e.to_string()),
        }
    }
}
