//! Copy entry point: decide how to reach the clipboard, then either hand the
//! payload to a detached owner process or fall back to a plain-text write.
//!
//! ```text
//! richclip copy ──spawn(setsid)──> richclip __clipboard-serve
//!      │  stdin: {"html": ..., "plain": ...}        │
//!      └─ returns immediately                       └─ Session::run() until cancelled
//! ```
//!
//! There is no back-channel: the caller reports success as soon as the owner
//! has been started.

use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::env::SessionEnv;
use crate::error::{ClipboardError, Result};
use crate::source::{OfferTable, Session};

/// Hidden subcommand the detached owner is started with.
pub const SERVE_SUBCOMMAND: &str = "__clipboard-serve";

/// The job handed from the requester to the owner over stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPayload {
    #[serde(alias = "HTML")]
    pub html: String,
    #[serde(alias = "Plain")]
    pub plain: String,
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Single-format clipboard used outside Wayland sessions.
pub trait PlainTextClipboard {
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// Starts a clipboard owner and hands it the serialized payload.
pub trait OwnerSpawner {
    fn spawn(&mut self, payload: &[u8]) -> Result<()>;
}

/// The desktop clipboard via `arboard`.
///
/// On X11 the text is only handed over to a running clipboard manager when
/// the `arboard::Clipboard` is dropped. Without one, the copied text may not
/// outlive this process.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl PlainTextClipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ClipboardError::Fallback(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| ClipboardError::Fallback(e.to_string()))
    }
}

/// Re-executes a program (normally this binary) in its own session.
#[derive(Debug, Clone)]
pub struct DetachedOwner {
    /// `None` means the current executable, resolved at spawn time
    program: Option<PathBuf>,
    /// Let the owner write to our stderr (set when `RUST_LOG` is present)
    inherit_stderr: bool,
}

impl DetachedOwner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            inherit_stderr: std::env::var_os("RUST_LOG").is_some(),
        }
    }

    /// Owner running the current executable.
    pub fn current_exe() -> Self {
        Self {
            program: None,
            inherit_stderr: std::env::var_os("RUST_LOG").is_some(),
        }
    }
}

impl OwnerSpawner for DetachedOwner {
    fn spawn(&mut self, payload: &[u8]) -> Result<()> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(ClipboardError::Spawn)?,
        };

        let mut command = Command::new(&program);
        command
            .arg(SERVE_SUBCOMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(if self.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            });

        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(ClipboardError::Spawn)?;
        log::debug!(
            "[LAUNCH] Started clipboard owner pid={} ({})",
            child.id(),
            program.display()
        );

        // Dropping stdin closes the pipe; the child is never waited on.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload).map_err(ClipboardError::Spawn)?;
        }
        Ok(())
    }
}

// =============================================================================
// Launcher
// =============================================================================

/// Chooses between the detached Wayland owner and the plain-text fallback.
pub struct Launcher<C, O> {
    env: SessionEnv,
    fallback: C,
    owner: O,
}

impl Launcher<SystemClipboard, DetachedOwner> {
    /// Launcher for the real environment, clipboard and executable.
    pub fn from_env() -> Self {
        Self::new(SessionEnv::from_env(), SystemClipboard, DetachedOwner::current_exe())
    }
}

impl<C: PlainTextClipboard, O: OwnerSpawner> Launcher<C, O> {
    pub fn new(env: SessionEnv, fallback: C, owner: O) -> Self {
        Self {
            env,
            fallback,
            owner,
        }
    }

    /// Publish `html` and `plain` to the clipboard.
    ///
    /// Without a Wayland session only `plain` is written and `html` is
    /// dropped. With one, this returns once the owner has been started, not
    /// once it holds the selection.
    pub fn write_multi_format(&mut self, html: &str, plain: &str) -> Result<()> {
        if !self.env.has_wayland_session() {
            log::debug!("[LAUNCH] No Wayland session, writing plain text only");
            return self.fallback.set_text(plain);
        }

        let payload = serde_json::to_vec(&ClipboardPayload {
            html: html.to_owned(),
            plain: plain.to_owned(),
        })?;
        log::debug!("[LAUNCH] Handing {} byte payload to clipboard owner", payload.len());
        self.owner.spawn(&payload)
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Copy HTML and plain text using the process environment.
pub fn write_multi_format(html: &str, plain: &str) -> Result<()> {
    Launcher::from_env().write_multi_format(html, plain)
}

/// Own the clipboard with `html` and `plain` until another client takes it.
pub fn serve_clipboard(html: &str, plain: &str) -> Result<()> {
    let offers = OfferTable::rich_text(html, plain);
    Session::connect(&SessionEnv::from_env(), offers)?.run()
}

/// Owner entry point: decode one payload from `reader`, then serve it.
pub fn serve_from_reader(reader: impl Read) -> Result<()> {
    let payload: ClipboardPayload = serde_json::from_reader(reader)?;
    serve_clipboard(&payload.html, &payload.plain)
}

// =============================================================================
// Tests
// =============================================================================
