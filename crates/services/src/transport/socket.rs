use std::fmt;

use url::Url;

use crate::error::SendRejection;

/// Monotonic id of one socket session. Events from anything but the
/// current session are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionSeq(u64);

impl SessionSeq {
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle and data events reported by a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Message(String),
    Error(String),
    /// Emitted exactly once per session, last.
    Closed { code: Option<u16>, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub seq: SessionSeq,
    pub event: SocketEvent,
}

impl SessionEvent {
    #[must_use]
    pub fn new(seq: SessionSeq, event: SocketEvent) -> Self {
        Self { seq, event }
    }
}

/// The transport's handle on one live socket.
pub trait SocketHandle: Send {
    /// Queue a text frame.
    ///
    /// # Errors
    ///
    /// Returns `SendRejection::Closed` once the socket is gone.
    fn send_text(&mut self, text: String) -> Result<(), SendRejection>;

    /// Bytes accepted by `send_text` but not yet written.
    fn buffered_amount(&self) -> usize;

    /// Start a graceful close. A `Closed` event follows.
    fn close(&mut self, code: u16, reason: &str);

    /// Stop delivering events for this session.
    fn detach(&mut self);
}

/// Opens sockets and routes their events back tagged with the session id.
pub trait Connector: Send {
    fn open(&mut self, seq: SessionSeq, url: &Url) -> Box<dyn SocketHandle>;
}
