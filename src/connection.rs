//! Blocking Wayland client connection.
//!
//! This module provides [`Connection`], which owns one compositor socket,
//! a rolling inbound buffer and a FIFO queue of file descriptors received via
//! `SCM_RIGHTS`. It frames the byte stream into whole [`Message`]s.
//!
//! # Descriptor ownership
//!
//! Received descriptors are held as [`OwnedFd`] in a queue owned by the
//! connection. Framing a message never touches that queue: only decoding an
//! event whose signature carries a descriptor claims the oldest one (see
//! [`Connection::read_event`]). fd-less events may share a read with the
//! `send` that owns a descriptor. Anything still queued is closed with the
//! connection.

use std::collections::VecDeque;
use std::io::{self, IoSliceMut, Write};
use std::mem::MaybeUninit;
use std::os::unix::io::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::Path;

use rustix::io::Errno;
use rustix::net::{recvmsg, RecvAncillaryBuffer, RecvAncillaryMessage, RecvFlags};

use crate::error::{ClipboardError, Result};
use crate::protocol::{Event, ObjectIds};
use crate::wire::{build_request, Arg, MessageHeader, HEADER_SIZE};

// =============================================================================
// Constants and Limits
// =============================================================================

/// Maximum file descriptors per message (Wayland limit)
const MAX_FDS_PER_MESSAGE: usize = 28;

/// Buffer capacity for a single socket read
const SOCKET_BUFFER_SIZE: usize = 4096;

// =============================================================================
// Socket Abstraction
// =============================================================================

/// Byte stream with ancillary descriptor delivery.
///
/// Implemented for [`UnixStream`]; tests substitute a scripted peer.
pub trait Socket {
    /// Blocking receive. Appends any received descriptors to `fds`.
    /// Returns `Ok(0)` on orderly close.
    fn recv_with_fds(&mut self, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize>;

    /// Write a whole frame.
    fn send_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl Socket for UnixStream {
    fn recv_with_fds(&mut self, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize> {
        recv_with_fds(self, buf, fds)
    }

    fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf)
    }
}

/// Receive data and file descriptors from a Unix socket.
///
/// Blocks until data, descriptors or EOF arrive. Interrupted calls are retried.
fn recv_with_fds(
    socket: &UnixStream,
    buf: &mut [u8],
    fds: &mut VecDeque<OwnedFd>,
) -> io::Result<usize> {
    let mut cmsg_space = [MaybeUninit::uninit(); rustix::cmsg_space!(ScmRights(MAX_FDS_PER_MESSAGE))];

    loop {
        let mut cmsg_buffer = RecvAncillaryBuffer::new(&mut cmsg_space);
        let mut iov = [IoSliceMut::new(buf)];

        let msg = match recvmsg(socket.as_fd(), &mut iov[..], &mut cmsg_buffer, RecvFlags::empty()) {
            Ok(msg) => msg,
            Err(e) if e == Errno::INTR => continue,
            Err(e) => return Err(e.into()),
        };

        for cmsg in cmsg_buffer.drain() {
            if let RecvAncillaryMessage::ScmRights(received_fds) = cmsg {
                for fd in received_fds {
                    log::trace!("[FD] Received {:?}", fd);
                    fds.push_back(fd);
                }
            }
        }

        if msg.bytes > 0 {
            log::trace!("[RECV] {} bytes, {} fds pending", msg.bytes, fds.len());
        }

        return Ok(msg.bytes);
    }
}

// =============================================================================
// Message
// =============================================================================

/// One complete inbound frame, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub object_id: u32,
    pub opcode: u16,
    /// Argument bytes, header excluded.
    pub payload: Vec<u8>,
}

// =============================================================================
// Connection
// =============================================================================

/// A buffered, blocking connection to the compositor.
pub struct Connection<S: Socket = UnixStream> {
    socket: S,
    /// Bytes received but not yet framed
    in_buf: Vec<u8>,
    /// Descriptors received but not yet claimed by an event
    pending_fds: VecDeque<OwnedFd>,
}

impl Connection<UnixStream> {
    /// Connect to the compositor socket at `path`.
    ///
    /// # Errors
    /// Returns [`ClipboardError::Connect`] if the socket cannot be reached.
    pub fn connect(path: &Path) -> Result<Self> {
        log::debug!("[CONN] Connecting to compositor: {}", path.display());

        let stream = UnixStream::connect(path).map_err(|source| ClipboardError::Connect {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("[CONN] Established (socket={})", path.display());
        Ok(Self::new(stream))
    }
}

impl<S: Socket> Connection<S> {
    /// Wrap an already-connected socket.
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            in_buf: Vec::with_capacity(SOCKET_BUFFER_SIZE),
            pending_fds: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn get_ref(&self) -> &S {
        &self.socket
    }

    /// Send one request built from typed arguments.
    pub fn send_request(&mut self, object_id: u32, opcode: u16, args: &[Arg<'_>]) -> Result<()> {
        let msg = build_request(object_id, opcode, args)?;
        log::trace!(
            "[SEND] object={}, opcode={}, {} bytes",
            object_id,
            opcode,
            msg.len()
        );
        self.socket.send_all(&msg)?;
        Ok(())
    }

    /// Read and decode the next event against `ids`.
    ///
    /// A `send` on the data source claims the oldest queued descriptor.
    /// Every other event leaves the queue alone.
    pub fn read_event(&mut self, ids: &ObjectIds) -> Result<Event> {
        let msg = self.read_message()?;
        Ok(Event::decode(msg, ids, &mut self.pending_fds)?)
    }

    /// Read the next complete frame.
    ///
    /// Frames already buffered are returned without touching the socket.
    /// Otherwise blocks for more bytes. Descriptors that arrive are queued,
    /// never attached here.
    ///
    /// # Errors
    /// - [`ClipboardError::Closed`] on a zero-byte read
    /// - [`ClipboardError::Wire`] if a header declares an invalid size
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(header) = MessageHeader::parse(&self.in_buf)? {
                if self.in_buf.len() >= header.size {
                    return Ok(self.take_message(header));
                }
                log::trace!(
                    "[RECV] Need more data: have {}, need {}",
                    self.in_buf.len(),
                    header.size
                );
            }

            let mut buf = [0u8; SOCKET_BUFFER_SIZE];
            let n = self.socket.recv_with_fds(&mut buf, &mut self.pending_fds)?;
            if n == 0 {
                log::debug!("[CONN] Compositor closed the connection");
                return Err(ClipboardError::Closed);
            }
            self.in_buf.extend_from_slice(&buf[..n]);
        }
    }

    fn take_message(&mut self, header: MessageHeader) -> Message {
        let payload = self.in_buf[HEADER_SIZE..header.size].to_vec();
        self.in_buf.drain(..header.size);

        log::trace!(
            "[RECV] Message: object={}, opcode={}, size={}, {} fds pending",
            header.object_id,
            header.opcode,
            header.size,
            self.pending_fds.len()
        );

        Message {
            object_id: header.object_id,
            opcode: header.opcode,
            payload,
        }
    }
}

impl<S: Socket> Drop for Connection<S> {
    fn drop(&mut self) {
        if !self.pending_fds.is_empty() {
            log::trace!("[CONN] Closing {} unclaimed fds", self.pending_fds.len());
        }
        log::debug!("[CONN] Closing");
    }
}

// =============================================================================
// Tests
// =============================================================================
