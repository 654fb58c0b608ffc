use std::time::Duration;

/// Terminal failure of a benchmark stream.
///
/// Exactly one of these is surfaced per failed run, captured at the point of
/// first occurrence. `Transport` means the peer (or the wire) said no,
/// `Timeout` means the peer said nothing, and `ProtocolViolation` means one
/// side is corrupt - the distinction matters to callers, so this is a real
/// enum rather than an opaque `anyhow` chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("stream did not reach a terminal state within {0:?}")]
    Timeout(Duration),
}

impl StreamError {
    pub fn transport(msg: impl Into<String>) -> StreamError {
        StreamError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> StreamError {
        StreamError::ProtocolViolation(msg.into())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> StreamError {
        StreamError::Transport(e.to_string())
    }
}
