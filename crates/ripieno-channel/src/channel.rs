//! Request/response multiplexer over a framed byte stream.
//!
//! One channel per peer pair, owned by exactly one thread. The owner drives
//! [`RemoteChannel::try_receive`]/[`RemoteChannel::try_send`] from readiness
//! notifications and receives interest changes back through its
//! [`EventControl`] adapter. All state is interior-mutable so the message
//! handler may re-enter the channel, including issuing a nested synchronous
//! request from inside a dispatch.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use crate::endpoint::Endpoint;
use crate::error::ChannelError;
use crate::event::{EventControl, FdFlags};
use crate::frame;
use crate::messages::{Kind, Message, Payload, Request};

const READ_CHUNK: usize = 16 * 1024;

/// Which peer this channel lives in. Advisory only: both sides follow the
/// same wire rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Plugin,
    Gui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    Open,
    /// Peer stopped sending but our output buffer is still draining.
    HalfClosed,
    Closed,
}

/// What a pending request resolves to: the matched response, or cancellation
/// when the channel closes first.
pub enum Reply {
    Response(Message),
    Canceled,
}

enum PendingReply {
    /// A synchronous waiter parked in [`RemoteChannel::send_request_sync`].
    Slot(Rc<RefCell<Option<Reply>>>),
    /// A fire-once response callback.
    Callback(Box<dyn FnOnce(Reply)>),
}

impl PendingReply {
    fn satisfy(self, reply: Reply) {
        match self {
            PendingReply::Slot(slot) => *slot.borrow_mut() = Some(reply),
            PendingReply::Callback(callback) => callback(reply),
        }
    }
}

/// Handler for inbound messages that are not responses to our requests.
///
/// The channel passes itself so the handler can answer with
/// [`RemoteChannel::send_response_async`].
pub type MessageHandler = Rc<dyn Fn(&RemoteChannel, &Message)>;

pub struct RemoteChannel {
    side: Side,
    handler: MessageHandler,
    control: Box<dyn EventControl>,
    endpoint: Endpoint,
    state: Cell<TransportState>,
    input: RefCell<Vec<u8>>,
    output: RefCell<Vec<u8>>,
    next_cookie: Cell<u32>,
    pending: RefCell<HashMap<u32, PendingReply>>,
}

impl RemoteChannel {
    pub fn new(
        handler: MessageHandler,
        side: Side,
        control: Box<dyn EventControl>,
        endpoint: Endpoint,
    ) -> Self {
        debug!(?side, "channel open");
        Self {
            side,
            handler,
            control,
            endpoint,
            state: Cell::new(TransportState::Open),
            input: RefCell::new(Vec::new()),
            output: RefCell::new(Vec::new()),
            next_cookie: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_open(&self) -> bool {
        self.state.get() == TransportState::Open
    }

    /// Whether frames are still queued for the peer. Owners driving their
    /// own poll loop use this to decide on write interest.
    pub fn has_pending_output(&self) -> bool {
        !self.output.borrow().is_empty()
    }

    #[cfg(unix)]
    pub fn fd(&self) -> std::os::unix::io::RawFd {
        self.endpoint.raw_fd()
    }

    /// Wait for readiness on the underlying endpoint.
    ///
    /// For owners that drive the channel from their own loop rather than
    /// host-delivered notifications (the GUI process does this).
    pub fn wait_readiness(
        &self,
        want_write: bool,
        timeout_ms: Option<u16>,
    ) -> io::Result<crate::endpoint::Readiness> {
        self.endpoint.wait(want_write, timeout_ms)
    }

    // -----------------------------------------------------------------------
    // Send paths
    // -----------------------------------------------------------------------

    /// Fire-and-forget request. Returns false when the channel is not open.
    /// Any response the peer sends is dropped as unmatched.
    pub fn send_request_async<P: Payload>(&self, request: &P) -> bool {
        if !self.is_open() {
            return false;
        }
        let payload = match bincode::serialize(request) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = ?P::KIND, error = %e, "request payload failed to encode");
                return false;
            }
        };
        let cookie = self.allocate_cookie();
        self.enqueue_frame(P::KIND, cookie, &payload);
        true
    }

    /// Asynchronous request with a response callback.
    ///
    /// The callback fires exactly once: with the decoded response, or with
    /// `None` when the channel closes before the response arrives.
    pub fn send_request_async_with<R, F>(&self, request: &R, callback: F) -> bool
    where
        R: Request,
        F: FnOnce(Option<R::Response>) + 'static,
    {
        if !self.is_open() {
            return false;
        }
        let payload = match bincode::serialize(request) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = ?R::KIND, error = %e, "request payload failed to encode");
                return false;
            }
        };

        let cookie = self.allocate_cookie();
        let entry = PendingReply::Callback(Box::new(move |reply| match reply {
            Reply::Response(msg) => match msg.decode::<R::Response>() {
                Ok(response) => callback(Some(response)),
                Err(e) => {
                    warn!(error = %e, "response payload failed to decode");
                    callback(None);
                }
            },
            Reply::Canceled => callback(None),
        }));
        self.pending.borrow_mut().insert(cookie, entry);
        self.enqueue_frame(R::KIND, cookie, &payload);
        true
    }

    /// Send a request and pump the endpoint until its response arrives or the
    /// channel closes.
    ///
    /// This is the only suspending operation on the channel. While it pumps,
    /// arbitrary other inbound messages are dispatched, including nested
    /// synchronous requests issued from the handler. Never call it from the
    /// audio thread.
    pub fn send_request_sync<R: Request>(&self, request: &R) -> Option<R::Response> {
        if !self.is_open() {
            return None;
        }
        let payload = match bincode::serialize(request) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = ?R::KIND, error = %e, "request payload failed to encode");
                return None;
            }
        };

        let cookie = self.allocate_cookie();
        let slot: Rc<RefCell<Option<Reply>>> = Rc::new(RefCell::new(None));
        self.pending
            .borrow_mut()
            .insert(cookie, PendingReply::Slot(Rc::clone(&slot)));
        self.enqueue_frame(R::KIND, cookie, &payload);

        self.pump_until_filled(&slot);

        // Pump may bail (poll failure) without the close path running; make
        // sure the entry cannot match a late reply.
        if slot.borrow().is_none() {
            self.pending.borrow_mut().remove(&cookie);
        }

        let taken = slot.borrow_mut().take();
        match taken {
            Some(Reply::Response(msg)) => match msg.decode::<R::Response>() {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!(error = %e, "response payload failed to decode");
                    None
                }
            },
            Some(Reply::Canceled) | None => None,
        }
    }

    /// Frame a response to a previously dispatched request.
    ///
    /// Usable while the peer can still read us, i.e. also in the half-closed
    /// drain window.
    pub fn send_response_async<P: Payload>(&self, response: &P, cookie: u32) {
        if self.state.get() == TransportState::Closed {
            return;
        }
        match bincode::serialize(response) {
            Ok(payload) => self.enqueue_frame(P::KIND, cookie, &payload),
            Err(e) => warn!(kind = ?P::KIND, error = %e, "response payload failed to encode"),
        }
    }

    /// Close the channel: best-effort flush, cancel every pending request
    /// exactly once, release the descriptor.
    pub fn close(&self) {
        if self.state.get() == TransportState::Closed {
            return;
        }
        self.try_send();
        if self.state.get() != TransportState::Closed {
            debug!(side = ?self.side, "channel closing");
            self.shutdown();
        }
    }

    // -----------------------------------------------------------------------
    // Readiness entry points, called by the owner
    // -----------------------------------------------------------------------

    /// Drain readable bytes and dispatch every complete frame.
    pub fn try_receive(&self) {
        if self.state.get() == TransportState::Closed {
            return;
        }

        let mut saw_eof = false;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.endpoint.try_read(&mut chunk) {
                Ok(0) => {
                    saw_eof = true;
                    break;
                }
                Ok(n) => self.input.borrow_mut().extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.fatal(ChannelError::Io(e));
                    return;
                }
            }
        }

        loop {
            let parsed = frame::take_frame(&mut self.input.borrow_mut());
            match parsed {
                Ok(Some(msg)) => self.dispatch(msg),
                Ok(None) => break,
                Err(e) => {
                    self.fatal(e);
                    return;
                }
            }
            if self.state.get() == TransportState::Closed {
                return;
            }
        }

        if saw_eof {
            self.peer_closed();
        }
    }

    /// Drain the output buffer as far as the endpoint allows. A partial write
    /// leaves the remainder at the head of the buffer for the next writable
    /// notification.
    pub fn try_send(&self) {
        if self.state.get() == TransportState::Closed {
            return;
        }

        let had_bytes;
        let now_empty;
        let mut write_error = None;
        {
            let mut output = self.output.borrow_mut();
            had_bytes = !output.is_empty();
            while !output.is_empty() {
                match self.endpoint.try_write(&output) {
                    Ok(0) => break,
                    Ok(n) => {
                        trace!(bytes = n, "wrote");
                        output.drain(..n);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        write_error = Some(e);
                        break;
                    }
                }
            }
            now_empty = output.is_empty();
        }

        if let Some(e) = write_error {
            self.fatal(ChannelError::Io(e));
            return;
        }

        if had_bytes && now_empty {
            if self.state.get() == TransportState::HalfClosed {
                // Outbound drained after the peer's EOF: nothing left to do.
                self.shutdown();
            } else {
                self.control.modify_fd(FdFlags::READ | FdFlags::ERROR);
            }
        }
    }

    /// Error readiness on the endpoint: the transport is gone.
    pub fn on_error(&self) {
        if self.state.get() == TransportState::Closed {
            return;
        }
        error!(side = ?self.side, "endpoint error, closing channel");
        self.shutdown();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn allocate_cookie(&self) -> u32 {
        let pending = self.pending.borrow();
        loop {
            let cookie = self.next_cookie.get();
            self.next_cookie.set(cookie.wrapping_add(1));
            // 0 is reserved for unsolicited messages; a wrapped counter must
            // also never collide with a request still in flight.
            if cookie != 0 && !pending.contains_key(&cookie) {
                return cookie;
            }
        }
    }

    fn enqueue_frame(&self, kind: Kind, cookie: u32, payload: &[u8]) {
        let was_empty = {
            let mut output = self.output.borrow_mut();
            let was_empty = output.is_empty();
            frame::encode_into(&mut output, kind as u32, cookie, payload);
            was_empty
        };
        if was_empty {
            self.control
                .modify_fd(FdFlags::READ | FdFlags::WRITE | FdFlags::ERROR);
        }
    }

    fn dispatch(&self, msg: Message) {
        let kind = match Kind::from_raw(msg.kind) {
            Some(kind) => kind,
            None => {
                self.fatal(ChannelError::UnknownKind(msg.kind));
                return;
            }
        };

        if kind.is_response() {
            if msg.cookie == 0 {
                debug!(?kind, "response without cookie dropped");
                return;
            }
            let entry = self.pending.borrow_mut().remove(&msg.cookie);
            match entry {
                Some(entry) => entry.satisfy(Reply::Response(msg)),
                // Late reply after cancellation.
                None => debug!(?kind, cookie = msg.cookie, "unmatched response dropped"),
            }
            return;
        }

        if msg.cookie != 0 && self.pending.borrow().contains_key(&msg.cookie) {
            self.fatal(ChannelError::CookieCollision {
                kind,
                cookie: msg.cookie,
            });
            return;
        }

        let handler = Rc::clone(&self.handler);
        handler(self, &msg);
    }

    fn peer_closed(&self) {
        match self.state.get() {
            TransportState::Open => {
                if self.output.borrow().is_empty() {
                    debug!(side = ?self.side, "peer closed");
                    self.shutdown();
                } else {
                    debug!(side = ?self.side, "peer closed, draining output");
                    self.state.set(TransportState::HalfClosed);
                }
            }
            TransportState::HalfClosed | TransportState::Closed => {}
        }
    }

    fn fatal(&self, err: ChannelError) {
        if self.state.get() == TransportState::Closed {
            return;
        }
        error!(side = ?self.side, error = %err, "channel fatal");
        self.shutdown();
    }

    fn shutdown(&self) {
        self.state.set(TransportState::Closed);
        self.input.borrow_mut().clear();
        self.output.borrow_mut().clear();
        self.cancel_pending();
        self.control.remove_fd();
        self.endpoint.shutdown();
    }

    fn cancel_pending(&self) {
        // Entries leave the table before any waiter runs, so a cancellation
        // can never fire twice and callbacks may safely re-enter the channel.
        let entries: Vec<PendingReply> = {
            let mut pending = self.pending.borrow_mut();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.satisfy(Reply::Canceled);
        }
    }

    fn pump_until_filled(&self, slot: &Rc<RefCell<Option<Reply>>>) {
        while slot.borrow().is_none() {
            if self.state.get() == TransportState::Closed {
                break;
            }
            let want_write = !self.output.borrow().is_empty();
            let readiness = match self.endpoint.wait(want_write, None) {
                Ok(readiness) => readiness,
                Err(e) => {
                    self.fatal(ChannelError::Io(e));
                    break;
                }
            };

            if readiness.error {
                self.on_error();
                continue;
            }
            if readiness.writable {
                self.try_send();
            }
            if readiness.readable || readiness.hangup {
                self.try_receive();
            }
        }
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        if self.state.get() != TransportState::Closed {
            self.close();
        }
    }
}
