//! Environment access: where the compositor socket lives and whether there is
//! a Wayland session at all.
//!
//! - `WAYLAND_DISPLAY`: compositor socket name or absolute path (default: `wayland-0`)
//! - `XDG_RUNTIME_DIR`: directory holding the socket (required for relative names)

use std::path::PathBuf;

use crate::error::{ClipboardError, Result};

/// Default compositor socket name
pub const DEFAULT_WAYLAND_DISPLAY: &str = "wayland-0";

/// Snapshot of the variables the clipboard owner reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    pub wayland_display: Option<String>,
    pub runtime_dir: Option<PathBuf>,
}

impl SessionEnv {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            wayland_display: get("WAYLAND_DISPLAY"),
            runtime_dir: get("XDG_RUNTIME_DIR").map(PathBuf::from),
        }
    }

    /// Whether a Wayland session is active.
    #[inline]
    pub fn has_wayland_session(&self) -> bool {
        self.wayland_display.is_some()
    }

    /// Resolve the compositor socket path.
    ///
    /// Absolute `WAYLAND_DISPLAY` values are used directly. Otherwise the
    /// display name (or [`DEFAULT_WAYLAND_DISPLAY`]) is joined onto
    /// `XDG_RUNTIME_DIR`.
    ///
    /// # Errors
    /// [`ClipboardError::MissingRuntimeDir`] when a relative name needs a
    /// runtime directory and none is set.
    pub fn socket_path(&self) -> Result<PathBuf> {
        let display = self
            .wayland_display
            .as_deref()
            .unwrap_or(DEFAULT_WAYLAND_DISPLAY);

        if display.starts_with('/') {
            return Ok(PathBuf::from(display));
        }

        let runtime_dir = self
            .runtime_dir
            .as_ref()
            .ok_or(ClipboardError::MissingRuntimeDir)?;
        log::debug!("[ENV] Socket '{}' resolved under {}", display, runtime_dir.display());
        Ok(runtime_dir.join(display))
    }
}
