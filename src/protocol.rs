//! Object IDs, opcodes and typed events for the handful of interfaces a
//! clipboard owner needs.

use std::collections::VecDeque;
use std::os::unix::io::OwnedFd;

use crate::connection::Message;
use crate::error::WireError;
use crate::wire::Reader;

// =============================================================================
// Interfaces
// =============================================================================

pub const WL_SEAT: &str = "wl_seat";
pub const ZWLR_DATA_CONTROL_MANAGER_V1: &str = "zwlr_data_control_manager_v1";

/// Version requested when binding `wl_seat`
pub const WL_SEAT_VERSION: u32 = 1;
/// Version requested when binding `zwlr_data_control_manager_v1`
pub const DATA_CONTROL_MANAGER_VERSION: u32 = 2;

/// Opcodes for the interfaces used by the clipboard owner
pub mod opcodes {
    /// wl_display.sync (request)
    pub const WL_DISPLAY_SYNC: u16 = 0;
    /// wl_display.get_registry (request)
    pub const WL_DISPLAY_GET_REGISTRY: u16 = 1;
    /// wl_display.error (event)
    pub const WL_DISPLAY_ERROR: u16 = 0;
    /// wl_display.delete_id (event)
    pub const WL_DISPLAY_DELETE_ID: u16 = 1;

    /// wl_registry.bind (request)
    pub const WL_REGISTRY_BIND: u16 = 0;
    /// wl_registry.global (event)
    pub const WL_REGISTRY_GLOBAL: u16 = 0;

    /// wl_callback.done (event)
    pub const WL_CALLBACK_DONE: u16 = 0;

    /// zwlr_data_control_manager_v1.create_data_source
    pub const MANAGER_CREATE_DATA_SOURCE: u16 = 0;
    /// zwlr_data_control_manager_v1.get_data_device
    pub const MANAGER_GET_DATA_DEVICE: u16 = 1;

    /// zwlr_data_control_device_v1.set_selection
    pub const DEVICE_SET_SELECTION: u16 = 0;

    /// zwlr_data_control_source_v1.offer (request)
    pub const SOURCE_OFFER: u16 = 0;
    /// zwlr_data_control_source_v1.send (event)
    pub const SOURCE_SEND: u16 = 0;
    /// zwlr_data_control_source_v1.cancelled (event)
    pub const SOURCE_CANCELLED: u16 = 1;
}

// =============================================================================
// Object Table
// =============================================================================

/// Client-side object IDs for one session.
///
/// Every object is created at most once, so the IDs are fixed up front.
/// `wl_display` is always 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectIds {
    pub display: u32,
    pub registry: u32,
    /// Callback for the global-discovery round-trip
    pub globals_callback: u32,
    pub seat: u32,
    pub manager: u32,
    pub source: u32,
    pub device: u32,
    /// Callback for the ownership-confirmation round-trip
    pub confirm_callback: u32,
}

impl Default for ObjectIds {
    fn default() -> Self {
        Self {
            display: 1,
            registry: 2,
            globals_callback: 3,
            seat: 4,
            manager: 5,
            source: 6,
            device: 7,
            confirm_callback: 8,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// An inbound event, decoded against the session's object table.
#[derive(Debug)]
pub enum Event {
    /// wl_display.error
    DisplayError {
        object_id: u32,
        code: u32,
        message: String,
    },
    /// wl_registry.global
    Global {
        name: u32,
        interface: String,
        version: u32,
    },
    /// wl_callback.done on either sync callback
    CallbackDone { callback: u32 },
    /// zwlr_data_control_source_v1.send, the only event here that carries a
    /// descriptor
    Send { mime_type: String, fd: Option<OwnedFd> },
    /// zwlr_data_control_source_v1.cancelled
    Cancelled,
    /// An opcode on the data source this client does not know
    UnknownSourceEvent { opcode: u16 },
    /// Anything else: other objects, `delete_id`, device offers
    Ignored { object_id: u32, opcode: u16 },
}

impl Event {
    /// Decode `msg` using `ids` to tell objects apart.
    ///
    /// Only `send` takes a descriptor, the oldest in `pending_fds`.
    pub fn decode(
        msg: Message,
        ids: &ObjectIds,
        pending_fds: &mut VecDeque<OwnedFd>,
    ) -> Result<Self, WireError> {
        let Message {
            object_id,
            opcode,
            payload,
        } = msg;
        let mut args = Reader::new(&payload);

        let event = if object_id == ids.display && opcode == opcodes::WL_DISPLAY_ERROR {
            Event::DisplayError {
                object_id: args.read_u32()?,
                code: args.read_u32()?,
                message: args.read_string()?,
            }
        } else if object_id == ids.registry && opcode == opcodes::WL_REGISTRY_GLOBAL {
            Event::Global {
                name: args.read_u32()?,
                interface: args.read_string()?,
                version: args.read_u32()?,
            }
        } else if (object_id == ids.globals_callback || object_id == ids.confirm_callback)
            && opcode == opcodes::WL_CALLBACK_DONE
        {
            Event::CallbackDone {
                callback: object_id,
            }
        } else if object_id == ids.source {
            match opcode {
                opcodes::SOURCE_SEND => Event::Send {
                    mime_type: args.read_string()?,
                    fd: pending_fds.pop_front(),
                },
                opcodes::SOURCE_CANCELLED => Event::Cancelled,
                other => Event::UnknownSourceEvent { opcode: other },
            }
        } else {
            Event::Ignored { object_id, opcode }
        };

        Ok(event)
    }
}

// =============================================================================
// Tests
// =============================================================================
