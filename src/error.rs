//! Error types for the live audio bridge and the REST client.

use thiserror::Error;

/// Failures of the live audio bridge.
///
/// None of these escape as process errors: the bridge recovers every one of
/// them to `idle` and reports a notice instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Microphone access was refused by the audio subsystem.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// The live session failed or was closed by the remote end.
    #[error("live session error: {0}")]
    Transport(String),

    /// Session establishment did not finish in time.
    #[error("timed out after {0} ms while connecting")]
    Timeout(u64),

    /// A single inbound frame could not be decoded.
    #[error("undecodable audio frame: {0}")]
    Decode(String),

    /// Capture or playback device failure.
    #[error("audio device error: {0}")]
    Device(String),
}

impl BridgeError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::Device(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether this error ends the running session.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// Errors from the `generateContent` REST call.
#[derive(Error, Debug)]
pub enum GenAiError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_decode_errors_keep_the_session() {
        assert!(!BridgeError::decode("bad base64").is_session_fatal());
        assert!(BridgeError::transport("closed").is_session_fatal());
        assert!(BridgeError::device("xrun").is_session_fatal());
        assert!(BridgeError::Timeout(10).is_session_fatal());
        assert!(BridgeError::PermissionDenied("EACCES".into()).is_session_fatal());
    }
}
