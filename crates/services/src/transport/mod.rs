mod session;
mod socket;
mod ws;

// Public API of the transport subsystem.
pub use session::{SessionTransport, TransportDiagnostics, TransportStatus};
pub use socket::{Connector, SessionEvent, SessionSeq, SocketEvent, SocketHandle};
pub use ws::{CLOSE_GRACE, WsConnector};

#[cfg(test)]
pub(crate) use session::fake;
