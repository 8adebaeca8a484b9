//! Scripted compositor peers for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::mem::MaybeUninit;
use std::os::unix::io::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

use rustix::net::{sendmsg, SendAncillaryBuffer, SendAncillaryMessage, SendFlags};

use crate::connection::Socket;
use crate::wire::{build_request, Arg, MessageHeader, Reader, HEADER_SIZE};

/// Encode an event frame. Events share the request framing.
pub fn event(object_id: u32, opcode: u16, args: &[Arg<'_>]) -> Vec<u8> {
    build_request(object_id, opcode, args).unwrap()
}

/// `(read_end, write_end)`
pub fn pipe() -> (OwnedFd, OwnedFd) {
    rustix::pipe::pipe().unwrap()
}

/// Send bytes plus descriptors over a real socket.
pub fn send_with_fds(socket: &UnixStream, buf: &[u8], fds: Vec<OwnedFd>) -> io::Result<usize> {
    let iov = [IoSlice::new(buf)];
    let borrowed: Vec<BorrowedFd<'_>> = fds.iter().map(|fd| fd.as_fd()).collect();

    let mut cmsg_space = vec![MaybeUninit::uninit(); rustix::cmsg_space!(ScmRights(borrowed.len()))];
    let mut cmsg_buffer = SendAncillaryBuffer::new(&mut cmsg_space);
    if !borrowed.is_empty() {
        cmsg_buffer.push(SendAncillaryMessage::ScmRights(&borrowed));
    }

    // The receiver holds its own copies; ours close when `fds` drops.
    Ok(sendmsg(socket.as_fd(), &iov, &mut cmsg_buffer, SendFlags::empty())?)
}

/// A sent request, decoded back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub object_id: u32,
    pub opcode: u16,
    pub args: Vec<u8>,
}

impl SentRequest {
    pub fn reader(&self) -> Reader<'_> {
        Reader::new(&self.args)
    }
}

/// Split a byte log into frames.
pub fn parse_frames(mut bytes: &[u8]) -> Vec<SentRequest> {
    let mut out = Vec::new();
    while let Some(header) = MessageHeader::parse(bytes).unwrap() {
        out.push(SentRequest {
            object_id: header.object_id,
            opcode: header.opcode,
            args: bytes[HEADER_SIZE..header.size].to_vec(),
        });
        bytes = &bytes[header.size..];
    }
    out
}

/// In-memory socket replaying a fixed sequence of reads.
///
/// Each scripted chunk is delivered by at most one `recv_with_fds` call (split
/// if the caller's buffer is smaller). Once the script runs out, reads return
/// 0 like an orderly close.
pub struct ScriptedSocket {
    chunks: VecDeque<(Vec<u8>, Vec<OwnedFd>)>,
    sent: Rc<RefCell<Vec<u8>>>,
}

impl ScriptedSocket {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().map(|c| (c, Vec::new())).collect(),
            sent: Rc::default(),
        }
    }

    pub fn push(&mut self, bytes: Vec<u8>) {
        self.chunks.push_back((bytes, Vec::new()));
    }

    pub fn push_with_fds(&mut self, bytes: Vec<u8>, fds: Vec<OwnedFd>) {
        self.chunks.push_back((bytes, fds));
    }

    /// Shared handle to every byte written so far.
    pub fn sent_log(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.sent)
    }

    pub fn is_drained(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Socket for ScriptedSocket {
    fn recv_with_fds(&mut self, buf: &mut [u8], fds: &mut VecDeque<OwnedFd>) -> io::Result<usize> {
        let Some((mut bytes, chunk_fds)) = self.chunks.pop_front() else {
            return Ok(0);
        };
        fds.extend(chunk_fds);

        if bytes.len() > buf.len() {
            let rest = bytes.split_off(buf.len());
            self.chunks.push_front((rest, Vec::new()));
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.sent.borrow_mut().extend_from_slice(buf);
        Ok(())
    }
}
