//! Sequence-numbered session state machine.
//!
//! The machine owns at most one socket at a time. Every socket is opened
//! under a fresh `SessionSeq`; events carry that id back, and anything
//! tagged with an older id is counted and dropped. Time is passed in
//! explicitly so the machine can be driven by a runtime loop or a test.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gestu_core::{BackoffPolicy, Clock, Message};
use tracing::{debug, info, warn};
use url::Url;

use super::socket::{Connector, SessionEvent, SessionSeq, SocketEvent, SocketHandle};
use crate::config::DEFAULT_BACKLOG_BYTES;
use crate::encoder::FrameSink;
use crate::error::SendRejection;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Connecting,
    Connected,
    Disconnected,
    Terminated,
}

impl TransportStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TransportStatus::Connecting => "connecting",
            TransportStatus::Connected => "connected",
            TransportStatus::Disconnected => "disconnected",
            TransportStatus::Terminated => "closed",
        }
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportDiagnostics {
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub errors: u64,
    pub sessions_opened: u64,
    pub stale_events_ignored: u64,
}

struct Session {
    seq: SessionSeq,
    handle: Box<dyn SocketHandle>,
    closing: bool,
}

/// Keeps one inference session alive across drops, hides and manual retries.
pub struct SessionTransport {
    url: Url,
    connector: Box<dyn Connector>,
    backoff: BackoffPolicy,
    backlog_limit: usize,
    clock: Clock,

    next_seq: u64,
    active_seq: Option<SessionSeq>,
    session: Option<Session>,
    status: TransportStatus,

    reconnect_enabled: bool,
    foreground: bool,
    reconnect_at: Option<Instant>,
    attempt: u32,
    pending_manual: bool,

    diagnostics: TransportDiagnostics,
}

impl SessionTransport {
    #[must_use]
    pub fn new(url: Url, connector: Box<dyn Connector>) -> Self {
        Self {
            url,
            connector,
            backoff: BackoffPolicy::default(),
            backlog_limit: DEFAULT_BACKLOG_BYTES,
            clock: Clock::default(),
            next_seq: 0,
            active_seq: None,
            session: None,
            status: TransportStatus::Disconnected,
            reconnect_enabled: true,
            foreground: true,
            reconnect_at: None,
            attempt: 0,
            pending_manual: false,
            diagnostics: TransportDiagnostics::default(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_backlog_limit(mut self, bytes: usize) -> Self {
        self.backlog_limit = bytes;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // ─── Observers ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn status(&self) -> TransportStatus {
        self.status
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn active_seq(&self) -> Option<SessionSeq> {
        self.active_seq
    }

    /// When the scheduled reconnect fires, if one is pending.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    #[must_use]
    pub fn reconnect_in(&self, now: Instant) -> Option<Duration> {
        self.reconnect_at.map(|at| at.saturating_duration_since(now))
    }

    #[must_use]
    pub fn is_reconnect_enabled(&self) -> bool {
        self.reconnect_enabled
    }

    #[must_use]
    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    #[must_use]
    pub fn has_pending_manual(&self) -> bool {
        self.pending_manual
    }

    #[must_use]
    pub fn diagnostics(&self) -> &TransportDiagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    // ─── Commands ───────────────────────────────────────────────────────────

    /// Open a session unless one is already live. `force` replaces a live
    /// session; the replaced one is detached before it is closed.
    pub fn connect(&mut self, force: bool) {
        if self.status == TransportStatus::Terminated {
            return;
        }
        if !self.foreground {
            debug!("connect skipped while in background");
            return;
        }
        let live = self.session.as_ref().is_some_and(|session| !session.closing);
        if live && !force {
            return;
        }

        self.reconnect_at = None;
        if let Some(mut old) = self.session.take() {
            old.handle.detach();
            if !old.closing {
                old.handle.close(CLOSE_NORMAL, "replaced");
            }
            debug!(seq = %old.seq, "session replaced");
        }

        self.next_seq += 1;
        let seq = SessionSeq::new(self.next_seq);
        let handle = self.connector.open(seq, &self.url);
        self.active_seq = Some(seq);
        self.session = Some(Session {
            seq,
            handle,
            closing: false,
        });
        self.status = TransportStatus::Connecting;
        self.diagnostics.sessions_opened += 1;
        info!(%seq, url = %self.url, attempt = self.attempt, "connecting");
    }

    /// Apply one socket event. Returns inbound text for the current session.
    pub fn handle_event(&mut self, event: SessionEvent, now: Instant) -> Option<String> {
        let current = self
            .session
            .as_ref()
            .filter(|session| Some(session.seq) == self.active_seq && session.seq == event.seq);
        let Some(session) = current else {
            self.diagnostics.stale_events_ignored += 1;
            debug!(seq = %event.seq, "stale socket event ignored");
            return None;
        };
        let closing = session.closing;

        match event.event {
            SocketEvent::Opened => {
                if closing {
                    return None;
                }
                self.status = TransportStatus::Connected;
                self.attempt = 0;
                info!(seq = %event.seq, "connected");
                None
            }
            SocketEvent::Message(text) => (!closing).then_some(text),
            SocketEvent::Error(message) => {
                warn!(seq = %event.seq, error = %message, "socket error");
                self.diagnostics.errors += 1;
                self.diagnostics.last_error = Some(message);
                self.diagnostics.last_error_at = Some(self.clock.now());
                None
            }
            SocketEvent::Closed { code, reason } => {
                info!(seq = %event.seq, ?code, %reason, "disconnected");
                self.on_closed(now);
                None
            }
        }
    }

    /// Fire the scheduled reconnect if it is due. Returns whether it fired.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        match self.reconnect_at {
            Some(at) if now >= at => {
                self.reconnect_at = None;
                self.connect(false);
                true
            }
            _ => false,
        }
    }

    /// Cancel any scheduled reconnect and start closing the live socket.
    pub fn disconnect(&mut self, code: u16, reason: &str) {
        self.reconnect_at = None;
        if let Some(session) = self.session.as_mut() {
            if !session.closing {
                session.closing = true;
                session.handle.close(code, reason);
            }
        }
    }

    /// The view went to the background: stop reconnecting and close.
    pub fn suspend(&mut self) {
        if self.status == TransportStatus::Terminated {
            return;
        }
        self.reconnect_enabled = false;
        self.foreground = false;
        self.pending_manual = false;
        self.disconnect(CLOSE_GOING_AWAY, "tab_hidden");
        self.status = TransportStatus::Disconnected;
        info!("transport suspended");
    }

    /// The view is visible again: reconnect immediately with a fresh backoff.
    pub fn resume(&mut self) {
        if self.status == TransportStatus::Terminated {
            return;
        }
        self.foreground = true;
        self.reconnect_enabled = true;
        self.pending_manual = false;
        self.attempt = 0;
        self.connect(true);
    }

    /// User-requested reconnect. Resets backoff and reconnects now, or as
    /// soon as an in-flight close completes.
    pub fn manual_reconnect(&mut self) {
        if self.status == TransportStatus::Terminated {
            return;
        }
        self.reconnect_enabled = true;
        self.attempt = 0;
        self.reconnect_at = None;

        let closing = self.session.as_ref().is_some_and(|session| session.closing);
        if closing || !self.foreground {
            self.pending_manual = true;
            debug!("manual reconnect deferred");
        } else {
            self.connect(true);
        }
    }

    /// Tear down for good. Later events and commands are ignored.
    pub fn shutdown(&mut self) {
        if self.status == TransportStatus::Terminated {
            return;
        }
        self.reconnect_enabled = false;
        self.reconnect_at = None;
        self.pending_manual = false;
        if let Some(mut session) = self.session.take() {
            session.handle.detach();
            if !session.closing {
                session.handle.close(CLOSE_NORMAL, "unmount");
            }
        }
        self.status = TransportStatus::Terminated;
        info!("transport shut down");
    }

    /// Send if the current session is open and not backlogged; otherwise drop.
    ///
    /// # Errors
    ///
    /// Returns `SendRejection` describing why nothing was sent.
    pub fn send(&mut self, message: &Message) -> Result<(), SendRejection> {
        if self.status == TransportStatus::Terminated {
            return Err(SendRejection::Terminated);
        }
        if self.status != TransportStatus::Connected {
            return Err(SendRejection::NotOpen);
        }
        let Some(session) = self.session.as_mut().filter(|session| !session.closing) else {
            return Err(SendRejection::NotOpen);
        };
        let buffered = session.handle.buffered_amount();
        if buffered > self.backlog_limit {
            return Err(SendRejection::Backlogged { buffered });
        }
        session.handle.send_text(message.encode()?)
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.status == TransportStatus::Connected
            && self.session.as_ref().is_some_and(|session| {
                !session.closing && session.handle.buffered_amount() <= self.backlog_limit
            })
    }

    fn on_closed(&mut self, now: Instant) {
        self.session = None;
        self.status = TransportStatus::Disconnected;

        if !self.foreground {
            return;
        }
        if self.pending_manual {
            self.pending_manual = false;
            self.attempt = 0;
            self.connect(false);
            return;
        }
        if !self.reconnect_enabled {
            return;
        }
        let delay = self.backoff.delay(self.attempt);
        self.reconnect_at = Some(now + delay);
        self.attempt = self.attempt.saturating_add(1);
        info!(delay_ms = delay.as_millis() as u64, attempt = self.attempt, "reconnect scheduled");
    }
}

impl FrameSink for SessionTransport {
    fn is_writable(&self) -> bool {
        SessionTransport::is_writable(self)
    }

    fn send_message(&mut self, message: &Message) -> Result<(), SendRejection> {
        self.send(message)
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
