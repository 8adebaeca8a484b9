//! Clipboard source: offers MIME types, claims the selection, then serves
//! paste requests until another client takes over.
//!
//! # State machine
//!
//! ```text
//! Connecting -> GlobalsPending -> GlobalsReady -> Bound -> SourceCreated
//!     -> SelectionSet -> Confirmed -> Serving -> Terminated
//! ```
//!
//! Transitions are driven by received events on a single blocking thread.

use std::fs::File;
use std::io::Write;
use std::ops::ControlFlow;
use std::os::unix::io::OwnedFd;
use std::os::unix::net::UnixStream;

use crate::bootstrap::{bind_globals, discover_globals};
use crate::connection::{Connection, Socket};
use crate::env::SessionEnv;
use crate::error::{ClipboardError, Result};
use crate::protocol::{opcodes, Event, ObjectIds};
use crate::wire::Arg;

// =============================================================================
// Offer Table
// =============================================================================

pub const MIME_TEXT_HTML: &str = "text/html";
pub const MIME_TEXT_PLAIN_UTF8: &str = "text/plain;charset=utf-8";
pub const MIME_TEXT_PLAIN: &str = "text/plain";
pub const MIME_UTF8_STRING: &str = "UTF8_STRING";
pub const MIME_STRING: &str = "STRING";

/// Immutable MIME type → payload mapping, in offer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferTable {
    entries: Vec<(String, Vec<u8>)>,
}

impl OfferTable {
    /// Build from `(mime_type, payload)` pairs. A repeated MIME type replaces
    /// the earlier payload but keeps its position.
    pub fn new<M, P>(entries: impl IntoIterator<Item = (M, P)>) -> Self
    where
        M: Into<String>,
        P: Into<Vec<u8>>,
    {
        let mut table: Vec<(String, Vec<u8>)> = Vec::new();
        for (mime, payload) in entries {
            let (mime, payload) = (mime.into(), payload.into());
            match table.iter_mut().find(|(m, _)| *m == mime) {
                Some(slot) => slot.1 = payload,
                None => table.push((mime, payload)),
            }
        }
        Self { entries: table }
    }

    /// HTML under `text/html`, the plain rendering under every text target.
    pub fn rich_text(html: &str, plain: &str) -> Self {
        Self::new([
            (MIME_TEXT_HTML, html),
            (MIME_TEXT_PLAIN_UTF8, plain),
            (MIME_TEXT_PLAIN, plain),
            (MIME_UTF8_STRING, plain),
            (MIME_STRING, plain),
        ])
    }

    pub fn get(&self, mime_type: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(m, _)| m == mime_type)
            .map(|(_, payload)| payload.as_slice())
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(m, _)| m.as_str())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    GlobalsPending,
    GlobalsReady,
    Bound,
    SourceCreated,
    SelectionSet,
    Confirmed,
    Serving,
    Terminated,
}

/// One clipboard-ownership session over one compositor connection.
pub struct Session<S: Socket = UnixStream> {
    conn: Connection<S>,
    ids: ObjectIds,
    offers: OfferTable,
    state: SessionState,
}

impl Session<UnixStream> {
    /// Connect to the compositor named by `env`.
    ///
    /// # Errors
    /// [`ClipboardError::MissingRuntimeDir`] before any socket activity, or
    /// [`ClipboardError::Connect`] if the socket is unreachable.
    pub fn connect(env: &SessionEnv, offers: OfferTable) -> Result<Self> {
        let path = env.socket_path()?;
        Ok(Self::new(Connection::connect(&path)?, offers))
    }
}

impl<S: Socket> Session<S> {
    pub fn new(conn: Connection<S>, offers: OfferTable) -> Self {
        Self {
            conn,
            ids: ObjectIds::default(),
            offers,
            state: SessionState::Connecting,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "state must move forward");
        log::debug!("[SOURCE] {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Discover and bind `wl_seat` and the data-control manager.
    pub fn bootstrap(&mut self) -> Result<()> {
        self.advance(SessionState::GlobalsPending);
        let globals = discover_globals(&mut self.conn, &self.ids)?;
        self.advance(SessionState::GlobalsReady);
        bind_globals(&mut self.conn, &self.ids, &globals)?;
        self.advance(SessionState::Bound);
        Ok(())
    }

    /// Create the data source and offer every MIME type in the table.
    pub fn create_offer(&mut self) -> Result<()> {
        self.conn.send_request(
            self.ids.manager,
            opcodes::MANAGER_CREATE_DATA_SOURCE,
            &[Arg::NewId(self.ids.source)],
        )?;
        for mime_type in self.offers.mime_types() {
            log::trace!("[SOURCE] Offering {}", mime_type);
            self.conn
                .send_request(self.ids.source, opcodes::SOURCE_OFFER, &[Arg::Str(mime_type)])?;
        }
        self.advance(SessionState::SourceCreated);
        Ok(())
    }

    /// Get the seat's data device and set our source as its selection.
    pub fn claim_selection(&mut self) -> Result<()> {
        self.conn.send_request(
            self.ids.manager,
            opcodes::MANAGER_GET_DATA_DEVICE,
            &[Arg::NewId(self.ids.device), Arg::Object(self.ids.seat)],
        )?;
        self.conn.send_request(
            self.ids.device,
            opcodes::DEVICE_SET_SELECTION,
            &[Arg::Object(self.ids.source)],
        )?;
        self.advance(SessionState::SelectionSet);
        Ok(())
    }

    /// Round-trip so the compositor has registered the selection.
    ///
    /// Source events that arrive first are handled as in [`Session::serve`].
    /// Returns `Break` if the source was already cancelled.
    pub fn confirm_ownership(&mut self) -> Result<ControlFlow<()>> {
        self.conn.send_request(
            self.ids.display,
            opcodes::WL_DISPLAY_SYNC,
            &[Arg::NewId(self.ids.confirm_callback)],
        )?;

        loop {
            match self.conn.read_event(&self.ids)? {
                Event::CallbackDone { callback } if callback == self.ids.confirm_callback => break,
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
                event => {
                    if self.handle_source_event(event).is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }
        }

        self.advance(SessionState::Confirmed);
        log::info!("[SOURCE] Selection owned ({} MIME types)", self.offers.len());
        Ok(ControlFlow::Continue(()))
    }

    /// Serve paste requests until cancelled or disconnected.
    ///
    /// Cancellation, orderly close and any transport failure all end the
    /// session successfully: once serving, a compositor going away looks the
    /// same as another client taking the selection.
    pub fn serve(mut self) -> Result<()> {
        self.advance(SessionState::Serving);

        loop {
            match self.conn.read_event(&self.ids) {
                Ok(event) => {
                    if self.handle_source_event(event).is_break() {
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("[SOURCE] Connection ended while serving: {}", e);
                    break;
                }
            }
        }

        self.advance(SessionState::Terminated);
        Ok(())
    }

    /// Full sequence: bootstrap, offer, claim, confirm, serve.
    pub fn run(mut self) -> Result<()> {
        self.bootstrap()?;
        self.create_offer()?;
        self.claim_selection()?;
        if self.confirm_ownership()?.is_break() {
            self.advance(SessionState::Terminated);
            return Ok(());
        }
        self.serve()
    }

    fn handle_source_event(&self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Send { mime_type, fd } => {
                match fd {
                    Some(fd) => self.send_payload(&mime_type, fd),
                    None => log::warn!("[SOURCE] send({}) arrived without a descriptor", mime_type),
                }
                ControlFlow::Continue(())
            }
            Event::Cancelled => {
                log::info!("[SOURCE] Selection taken by another client");
                ControlFlow::Break(())
            }
            Event::UnknownSourceEvent { opcode } => {
                log::debug!("[SOURCE] Unknown source event opcode {}, stopping", opcode);
                ControlFlow::Break(())
            }
            Event::DisplayError {
                object_id,
                code,
                message,
            } => {
                log::warn!(
                    "[SOURCE] Compositor error on object {} (code {}): {}",
                    object_id,
                    code,
                    message
                );
                ControlFlow::Continue(())
            }
            other => {
                log::trace!("[SOURCE] Ignoring {:?}", other);
                ControlFlow::Continue(())
            }
        }
    }

    /// Write the payload for `mime_type` to `fd`, then close it.
    fn send_payload(&self, mime_type: &str, fd: OwnedFd) {
        let mut target = File::from(fd);
        match self.offers.get(mime_type) {
            Some(data) => {
                if let Err(e) = target.write_all(data) {
                    log::warn!("[SOURCE] Writing {} failed: {}", mime_type, e);
                } else {
                    log::debug!("[SOURCE] Served {} ({} bytes)", mime_type, data.len());
                }
            }
            None => log::debug!("[SOURCE] Requested type {} not offered", mime_type),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{WL_SEAT, ZWLR_DATA_CONTROL_MANAGER_V1};
    use crate::test_support::{event, parse_frames, pipe, send_with_fds, ScriptedSocket};
    use std::io::Read;

    fn read_all(fd: OwnedFd) -> Vec<u8> {
        let mut out = Vec::new();
        File::from(fd).read_to_end(&mut out).unwrap();
        out
    }

    fn send_event(mime: &str) -> Vec<u8> {
        event(6, opcodes::SOURCE_SEND, &[Arg::Str(mime)])
    }

    fn cancelled() -> Vec<u8> {
        event(6, opcodes::SOURCE_CANCELLED, &[])
    }

    fn handshake(ids: &ObjectIds) -> Vec<Vec<u8>> {
        vec![
            event(2, 0, &[Arg::Uint(7), Arg::Str(WL_SEAT), Arg::Uint(7)]),
            event(2, 0, &[Arg::Uint(9), Arg::Str(ZWLR_DATA_CONTROL_MANAGER_V1), Arg::Uint(2)]),
            event(ids.globals_callback, 0, &[Arg::Uint(0)]),
            event(ids.confirm_callback, 0, &[Arg::Uint(0)]),
        ]
    }

    fn serving_session(socket: ScriptedSocket, offers: OfferTable) -> Session<ScriptedSocket> {
        let mut session = Session::new(Connection::new(socket), offers);
        session.state = SessionState::Confirmed;
        session
    }

    #[test]
    fn test_rich_text_offers() {
        let table = OfferTable::rich_text("<b>hi</b>", "hi");
        let types: Vec<_> = table.mime_types().collect();
        assert_eq!(
            types,
            vec![MIME_TEXT_HTML, MIME_TEXT_PLAIN_UTF8, MIME_TEXT_PLAIN, MIME_UTF8_STRING, MIME_STRING]
        );
        assert_eq!(table.get(MIME_TEXT_HTML), Some(&b"<b>hi</b>"[..]));
        assert_eq!(table.get(MIME_STRING), Some(&b"hi"[..]));
        assert_eq!(table.get("image/png"), None);
    }

    #[test]
    fn test_offer_table_replaces_duplicates() {
        let table = OfferTable::new([("text/plain", "a"), ("text/html", "b"), ("text/plain", "c")]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("text/plain"), Some(&b"c"[..]));
        assert_eq!(table.mime_types().next(), Some("text/plain"));
    }

    #[test]
    fn test_send_writes_payload_and_closes() {
        let (read_end, write_end) = pipe();
        let mut socket = ScriptedSocket::new(vec![]);
        socket.push_with_fds(send_event("text/plain"), vec![write_end]);

        let session = serving_session(socket, OfferTable::new([("text/plain", "hello")]));
        session.serve().unwrap();

        // EOF after the payload proves the write end was closed.
        assert_eq!(read_all(read_end), b"hello");
    }

    #[test]
    fn test_unknown_mime_closes_without_writing() {
        let (read_end, write_end) = pipe();
        let mut socket = ScriptedSocket::new(vec![]);
        socket.push_with_fds(send_event("application/x-unknown"), vec![write_end]);
        socket.push(cancelled());

        let session = serving_session(socket, OfferTable::rich_text("<b>hi</b>", "hi"));
        session.serve().unwrap();

        assert!(read_all(read_end).is_empty());
    }

    #[test]
    fn test_cancelled_stops_serving() {
        let (read_end, write_end) = pipe();
        let mut socket = ScriptedSocket::new(vec![cancelled()]);
        // Never reached: cancelled short-circuits the loop.
        socket.push_with_fds(send_event("text/plain"), vec![write_end]);

        let session = serving_session(socket, OfferTable::new([("text/plain", "hello")]));
        session.serve().unwrap();

        // The unread descriptor is released with the script, not written to.
        assert!(read_all(read_end).is_empty());
    }

    #[test]
    fn test_events_for_other_objects_are_skipped() {
        let (read_end, write_end) = pipe();
        let mut socket = ScriptedSocket::new(vec![
            event(7, 0, &[Arg::NewId(0xff00_0000)]),
            event(7, 1, &[Arg::Object(0xff00_0000)]),
            event(1, 1, &[Arg::Uint(3)]),
        ]);
        socket.push_with_fds(send_event("text/html"), vec![write_end]);
        socket.push(cancelled());

        let session = serving_session(socket, OfferTable::rich_text("<i>x</i>", "x"));
        session.serve().unwrap();

        assert_eq!(read_all(read_end), b"<i>x</i>");
    }

    #[test]
    fn test_device_events_sharing_a_read_do_not_steal_paste_fd() {
        let (read_end, write_end) = pipe();

        // Another client changed its selection: the device reports it in the
        // same read as our paste request.
        let mut chunk = event(7, 0, &[Arg::NewId(0xff00_0001)]);
        chunk.extend(event(0xff00_0001, 0, &[Arg::Str("text/plain")]));
        chunk.extend(event(7, 1, &[Arg::Object(0)]));
        chunk.extend(send_event("text/plain"));
        chunk.extend(cancelled());
        let mut socket = ScriptedSocket::new(vec![]);
        socket.push_with_fds(chunk, vec![write_end]);

        let session = serving_session(socket, OfferTable::new([("text/plain", "hello")]));
        session.serve().unwrap();

        assert_eq!(read_all(read_end), b"hello");
    }

    #[test]
    fn test_device_event_before_send_over_real_socket() {
        let (client, server) = UnixStream::pair().unwrap();
        let (read_end, write_end) = pipe();

        send_with_fds(&server, &event(7, 1, &[Arg::Object(0)]), vec![]).unwrap();
        send_with_fds(&server, &send_event(MIME_TEXT_PLAIN), vec![write_end]).unwrap();
        send_with_fds(&server, &cancelled(), vec![]).unwrap();

        let mut session = Session::new(Connection::new(client), OfferTable::rich_text("<b>hi</b>", "hello"));
        session.state = SessionState::Confirmed;
        session.serve().unwrap();

        assert_eq!(read_all(read_end), b"hello");
    }

    #[test]
    fn test_run_full_sequence() {
        let ids = ObjectIds::default();
        let (read_end, write_end) = pipe();

        let mut socket = ScriptedSocket::new(handshake(&ids));
        socket.push_with_fds(send_event(MIME_TEXT_PLAIN_UTF8), vec![write_end]);
        socket.push(cancelled());
        let sent = socket.sent_log();

        let session = Session::new(Connection::new(socket), OfferTable::rich_text("<b>hi</b>", "hi"));
        session.run().unwrap();
        assert_eq!(read_all(read_end), b"hi");

        let frames = parse_frames(&sent.borrow());
        let ops: Vec<(u32, u16)> = frames.iter().map(|f| (f.object_id, f.opcode)).collect();
        assert_eq!(
            ops,
            vec![
                (ids.display, opcodes::WL_DISPLAY_GET_REGISTRY),
                (ids.display, opcodes::WL_DISPLAY_SYNC),
                (ids.registry, opcodes::WL_REGISTRY_BIND),
                (ids.registry, opcodes::WL_REGISTRY_BIND),
                (ids.manager, opcodes::MANAGER_CREATE_DATA_SOURCE),
                (ids.source, opcodes::SOURCE_OFFER),
                (ids.source, opcodes::SOURCE_OFFER),
                (ids.source, opcodes::SOURCE_OFFER),
                (ids.source, opcodes::SOURCE_OFFER),
                (ids.source, opcodes::SOURCE_OFFER),
                (ids.manager, opcodes::MANAGER_GET_DATA_DEVICE),
                (ids.device, opcodes::DEVICE_SET_SELECTION),
                (ids.display, opcodes::WL_DISPLAY_SYNC),
            ]
        );

        let offered: Vec<String> = frames[5..10]
            .iter()
            .map(|f| f.reader().read_string().unwrap())
            .collect();
        assert_eq!(offered[0], MIME_TEXT_HTML);
        assert_eq!(offered[4], MIME_STRING);

        let mut device = frames[10].reader();
        assert_eq!(device.read_u32().unwrap(), ids.device);
        assert_eq!(device.read_u32().unwrap(), ids.seat);
        assert_eq!(frames[11].reader().read_u32().unwrap(), ids.source);
    }

    #[test]
    fn test_send_during_confirmation_is_served() {
        let ids = ObjectIds::default();
        let (read_end, write_end) = pipe();

        let mut chunks = handshake(&ids);
        let confirm_done = chunks.pop().unwrap();
        let mut socket = ScriptedSocket::new(chunks);
        socket.push_with_fds(send_event(MIME_TEXT_HTML), vec![write_end]);
        socket.push(confirm_done);
        socket.push(cancelled());

        let session = Session::new(Connection::new(socket), OfferTable::rich_text("<b>hi</b>", "hi"));
        session.run().unwrap();
        assert_eq!(read_all(read_end), b"<b>hi</b>");
    }

    #[test]
    fn test_missing_manager_fails_run() {
        let ids = ObjectIds::default();
        let socket = ScriptedSocket::new(vec![
            event(2, 0, &[Arg::Uint(7), Arg::Str(WL_SEAT), Arg::Uint(7)]),
            event(ids.globals_callback, 0, &[Arg::Uint(0)]),
        ]);
        let session = Session::new(Connection::new(socket), OfferTable::rich_text("", ""));

        assert!(matches!(
            session.run(),
            Err(ClipboardError::MissingGlobal { interface: ZWLR_DATA_CONTROL_MANAGER_V1 })
        ));
    }

    #[test]
    fn test_close_before_confirmation_is_error() {
        let ids = ObjectIds::default();
        let mut chunks = handshake(&ids);
        chunks.pop();
        let session = Session::new(Connection::new(ScriptedSocket::new(chunks)), OfferTable::rich_text("", ""));

        assert!(session.run().unwrap_err().is_closed());
    }

    #[test]
    fn test_serve_over_real_socket_closes_connection() {
        let (client, server) = UnixStream::pair().unwrap();
        let (read_end, write_end) = pipe();

        send_with_fds(&server, &send_event(MIME_UTF8_STRING), vec![write_end]).unwrap();
        send_with_fds(&server, &cancelled(), vec![]).unwrap();

        let mut session = Session::new(Connection::new(client), OfferTable::rich_text("<b>hi</b>", "hi"));
        session.state = SessionState::Confirmed;
        session.serve().unwrap();

        assert_eq!(read_all(read_end), b"hi");

        // The session dropped its end, so the compositor side sees EOF.
        let mut rest = Vec::new();
        (&server).read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn test_orderly_close_while_serving_is_success() {
        let session = serving_session(ScriptedSocket::new(vec![]), OfferTable::rich_text("", ""));
        assert!(session.serve().is_ok());
    }
}
