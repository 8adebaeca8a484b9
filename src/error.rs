//! Error taxonomy for the clipboard owner.
//!
//! Two layers: [`WireError`] for malformed bytes on the wire, and
//! [`ClipboardError`] for everything a session or the launcher can hit.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Codec failures: the bytes on the wire do not describe a valid message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Fewer bytes remain than the next field requires.
    #[error("truncated message: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// A message header declared an impossible size.
    #[error("invalid message size {0}")]
    InvalidSize(usize),

    /// A string argument was not valid UTF-8.
    #[error("string argument is not valid UTF-8")]
    InvalidUtf8,

    /// A non-empty string argument did not end with a NUL byte.
    #[error("string argument is missing its NUL terminator")]
    MissingTerminator,

    /// A string to be sent contains a NUL byte before its end.
    #[error("string argument contains an interior NUL byte")]
    InteriorNul,

    /// An outgoing request would exceed the protocol's message size limit.
    #[error("request of {0} bytes exceeds the maximum message size")]
    TooLarge(usize),
}

/// Everything that can end a clipboard session or a copy request.
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// `XDG_RUNTIME_DIR` is not set, so the compositor socket cannot be located.
    #[error("XDG_RUNTIME_DIR not set")]
    MissingRuntimeDir,

    /// The compositor socket could not be connected.
    #[error("failed to connect to {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Socket or descriptor I/O failed mid-session.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The compositor did not advertise a required global.
    #[error("{interface} not advertised by the compositor (is wlr-data-control supported?)")]
    MissingGlobal { interface: &'static str },

    /// Malformed or truncated protocol data.
    #[error("framing error: {0}")]
    Wire(#[from] WireError),

    /// The compositor closed the connection (zero-byte read).
    #[error("connection closed by compositor")]
    Closed,

    /// The compositor reported a fatal protocol error via `wl_display.error`.
    #[error("protocol error on object {object_id} (code {code}): {message}")]
    Protocol {
        object_id: u32,
        code: u32,
        message: String,
    },

    /// The owner payload could not be encoded or decoded.
    #[error("invalid clipboard payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The detached clipboard owner could not be started.
    #[error("failed to start clipboard owner: {0}")]
    Spawn(#[source] io::Error),

    /// The plain-text clipboard write failed.
    #[error("plain-text clipboard write failed: {0}")]
    Fallback(String),
}

impl ClipboardError {
    /// Whether this is an orderly remote close rather than a real failure.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, ClipboardError::Closed)
    }
}

pub type Result<T, E = ClipboardError> = std::result::Result<T, E>;
