//! Registry discovery and binding.
//!
//! # Sequence
//!
//! ```text
//! wl_display.get_registry(registry)
//! wl_display.sync(callback)
//!     <- wl_registry.global ... (repeated)
//!     <- wl_callback.done
//! wl_registry.bind(seat_name, "wl_seat", 1, seat)
//! wl_registry.bind(manager_name, "zwlr_data_control_manager_v1", 2, manager)
//! ```
//!
//! Bind versions are capped at what the compositor advertised.

use crate::connection::{Connection, Socket};
use crate::error::{ClipboardError, Result};
use crate::protocol::{
    opcodes, Event, ObjectIds, DATA_CONTROL_MANAGER_VERSION, WL_SEAT, WL_SEAT_VERSION,
    ZWLR_DATA_CONTROL_MANAGER_V1,
};
use crate::wire::Arg;

/// An advertised global: its numeric name and highest supported version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalRef {
    pub name: u32,
    pub version: u32,
}

/// The two globals the clipboard owner binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Globals {
    pub seat: GlobalRef,
    pub manager: GlobalRef,
}

/// Request the registry and collect globals until the sync callback fires.
///
/// Unrelated globals are skipped. If an interface is advertised twice, the
/// last name wins.
///
/// # Errors
/// - [`ClipboardError::MissingGlobal`] if either required interface is absent
/// - [`ClipboardError::Protocol`] if the compositor reports an error first
pub fn discover_globals<S: Socket>(conn: &mut Connection<S>, ids: &ObjectIds) -> Result<Globals> {
    conn.send_request(
        ids.display,
        opcodes::WL_DISPLAY_GET_REGISTRY,
        &[Arg::NewId(ids.registry)],
    )?;
    conn.send_request(
        ids.display,
        opcodes::WL_DISPLAY_SYNC,
        &[Arg::NewId(ids.globals_callback)],
    )?;

    let mut seat = None;
    let mut manager = None;

    loop {
        match conn.read_event(ids)? {
            Event::Global {
                name,
                interface,
                version,
            } => match interface.as_str() {
                WL_SEAT => {
                    log::debug!("[BOOT] wl_seat v{} advertised as global {}", version, name);
                    seat = Some(GlobalRef { name, version });
                }
                ZWLR_DATA_CONTROL_MANAGER_V1 => {
                    log::debug!(
                        "[BOOT] data-control manager v{} advertised as global {}",
                        version,
                        name
                    );
                    manager = Some(GlobalRef { name, version });
                }
                other => log::trace!("[BOOT] Skipping global {} ({})", name, other),
            },
            Event::CallbackDone { callback } if callback == ids.globals_callback => break,
            Event::DisplayError {
                object_id,
                code,
                message,
            } => {
                return Err(ClipboardError::Protocol {
                    object_id,
                    code,
                    message,
                })
            }
            other => log::trace!("[BOOT] Ignoring {:?}", other),
        }
    }

    let seat = seat.ok_or(ClipboardError::MissingGlobal { interface: WL_SEAT })?;
    let manager = manager.ok_or(ClipboardError::MissingGlobal {
        interface: ZWLR_DATA_CONTROL_MANAGER_V1,
    })?;

    Ok(Globals { seat, manager })
}

/// Bind `wl_seat` and the data-control manager to their fixed object IDs.
pub fn bind_globals<S: Socket>(conn: &mut Connection<S>, ids: &ObjectIds, globals: &Globals) -> Result<()> {
    bind(conn, ids.registry, globals.seat, WL_SEAT, WL_SEAT_VERSION, ids.seat)?;
    bind(
        conn,
        ids.registry,
        globals.manager,
        ZWLR_DATA_CONTROL_MANAGER_V1,
        DATA_CONTROL_MANAGER_VERSION,
        ids.manager,
    )?;
    log::info!("[BOOT] Bound wl_seat@{} and data-control manager@{}", ids.seat, ids.manager);
    Ok(())
}

/// `wl_registry.bind` carries an untyped `new_id`, so the interface name and
/// version travel inline before the ID.
fn bind<S: Socket>(
    conn: &mut Connection<S>,
    registry: u32,
    global: GlobalRef,
    interface: &str,
    wanted_version: u32,
    new_id: u32,
) -> Result<()> {
    let version = wanted_version.min(global.version);
    conn.send_request(
        registry,
        opcodes::WL_REGISTRY_BIND,
        &[
            Arg::Uint(global.name),
            Arg::Str(interface),
            Arg::Uint(version),
            Arg::NewId(new_id),
        ],
    )
}

// =============================================================================
// Tests
// =============================================================================
