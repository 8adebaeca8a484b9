//! # richclip
//!
//! Publishes HTML and plain text to the Wayland clipboard so the content stays
//! pasteable after the copying command exits.
//!
//! ## Overview
//!
//! The `wlr-data-control` protocol is spoken directly over the compositor's
//! Unix socket: a hand-written codec frames messages, file descriptors for
//! paste requests arrive as `SCM_RIGHTS` ancillary data, and a blocking state
//! machine owns the selection until another client replaces it.
//!
//! Because a selection only lives as long as its owner's connection, a copy
//! re-executes the current binary as a detached process (`__clipboard-serve`)
//! and hands it the content over stdin.
//!
//! ## Environment Variables
//!
//! - `WAYLAND_DISPLAY`: compositor socket; unset means "no Wayland session"
//!   and only plain text is copied
//! - `XDG_RUNTIME_DIR`: directory holding the socket (required)
//! - `RUST_LOG`: log level; when set, the detached owner also logs to stderr

pub mod bootstrap;
pub mod connection;
pub mod env;
pub mod error;
pub mod launcher;
pub mod protocol;
pub mod source;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use env::SessionEnv;
pub use error::{ClipboardError, Result, WireError};
pub use launcher::{
    serve_clipboard, serve_from_reader, write_multi_format, ClipboardPayload, Launcher,
    SERVE_SUBCOMMAND,
};
pub use source::{OfferTable, Session, SessionState};
