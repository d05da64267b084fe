use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace};
use url::Url;

use super::socket::{Connector, SessionEvent, SessionSeq, SocketEvent, SocketHandle};
use crate::error::SendRejection;

/// How long a requested close waits for the peer's close frame.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// WebSocket connector; one task per session, events funnelled into a
/// single channel. Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct WsConnector {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl WsConnector {
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }
}

impl Connector for WsConnector {
    fn open(&mut self, seq: SessionSeq, url: &Url) -> Box<dyn SocketHandle> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        let attached = Arc::new(AtomicBool::new(true));
        let emitter = Emitter {
            seq,
            attached: Arc::clone(&attached),
            events: self.events.clone(),
        };
        tokio::spawn(run_socket(
            url.clone(),
            outbound_rx,
            Arc::clone(&buffered),
            emitter,
        ));
        Box::new(WsHandle {
            outbound,
            buffered,
            attached,
        })
    }
}

struct WsHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    buffered: Arc<AtomicUsize>,
    attached: Arc<AtomicBool>,
}

impl SocketHandle for WsHandle {
    fn send_text(&mut self, text: String) -> Result<(), SendRejection> {
        let len = text.len();
        self.buffered.fetch_add(len, Ordering::AcqRel);
        self.outbound.send(Outbound::Text(text)).map_err(|_| {
            self.buffered.fetch_sub(len, Ordering::AcqRel);
            SendRejection::Closed
        })
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }

    fn detach(&mut self) {
        self.attached.store(false, Ordering::Release);
    }
}

struct Emitter {
    seq: SessionSeq,
    attached: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Emitter {
    fn emit(&self, event: SocketEvent) {
        if self.attached.load(Ordering::Acquire) {
            let _ = self.events.send(SessionEvent::new(self.seq, event));
        } else {
            trace!(seq = %self.seq, "event from detached session dropped");
        }
    }

    fn closed(&self, code: Option<u16>, reason: impl Into<String>) {
        self.emit(SocketEvent::Closed {
            code,
            reason: reason.into(),
        });
    }
}

async fn run_socket(
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    buffered: Arc<AtomicUsize>,
    emitter: Emitter,
) {
    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(err) => {
                emitter.emit(SocketEvent::Error(err.to_string()));
                emitter.closed(None, "connect failed");
                return;
            }
        },
        (code, reason) = close_requested(&mut outbound, &buffered) => {
            debug!(seq = %emitter.seq, "closed before open");
            emitter.closed(Some(code), reason);
            return;
        }
    };

    emitter.emit(SocketEvent::Opened);
    let (mut write, mut read) = stream.split();

    let (code, reason) = loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => emitter.emit(SocketEvent::Message(text)),
                Some(Ok(WsMessage::Close(frame))) => {
                    break match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    emitter.emit(SocketEvent::Error(err.to_string()));
                    break (None, "stream error".to_string());
                }
                None => break (None, "stream ended".to_string()),
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    let len = text.len();
                    let result = write.send(WsMessage::Text(text)).await;
                    buffered.fetch_sub(len, Ordering::AcqRel);
                    if let Err(err) = result {
                        emitter.emit(SocketEvent::Error(err.to_string()));
                        break (None, "send failed".to_string());
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    let _ = write.send(WsMessage::Close(Some(frame))).await;
                    let drained = tokio::time::timeout(CLOSE_GRACE, async {
                        while let Some(Ok(message)) = read.next().await {
                            if message.is_close() {
                                break;
                            }
                        }
                    })
                    .await;
                    if drained.is_err() {
                        debug!(seq = %emitter.seq, "peer did not acknowledge close");
                    }
                    break (Some(code), reason);
                }
                None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    break (Some(1000), "handle dropped".to_string());
                }
            },
        }
    };

    emitter.closed(code, reason);
}

/// Resolves once a close is requested while the socket is still connecting.
/// Frames queued in the meantime are discarded.
async fn close_requested(
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    buffered: &AtomicUsize,
) -> (u16, String) {
    loop {
        match outbound.recv().await {
            Some(Outbound::Text(text)) => {
                buffered.fetch_sub(text.len(), Ordering::AcqRel);
            }
            Some(Outbound::Close { code, reason }) => return (code, reason),
            None => return (1000, "handle dropped".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    /// Accepts one client, pushes one result, then records everything the
    /// client sends until the connection ends.
    async fn echo_server(listener: TcpListener) -> Vec<WsMessage> {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.send(WsMessage::Text(r#"{"kind":"result","word":"а"}"#.into()))
            .await
            .unwrap();
        let mut received = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            received.push(message);
        }
        received
    }

    #[tokio::test]
    async fn open_exchange_and_close_emit_one_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(echo_server(listener));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new(tx);
        let url = Url::parse(&format!("ws://{addr}/ws/gesture")).unwrap();
        let mut handle = connector.open(SessionSeq::new(3), &url);

        let opened = rx.recv().await.unwrap();
        assert_eq!(opened.seq, SessionSeq::new(3));
        assert_eq!(opened.event, SocketEvent::Opened);

        handle.send_text("hello".to_string()).unwrap();
        let inbound = rx.recv().await.unwrap();
        assert_eq!(
            inbound.event,
            SocketEvent::Message(r#"{"kind":"result","word":"а"}"#.to_string())
        );

        handle.close(1001, "tab_hidden");
        let closed = rx.recv().await.unwrap();
        assert_eq!(
            closed.event,
            SocketEvent::Closed {
                code: Some(1001),
                reason: "tab_hidden".to_string(),
            }
        );
        assert_eq!(handle.buffered_amount(), 0);

        drop(handle);
        drop(connector);
        assert!(rx.recv().await.is_none());

        let received = server.await.unwrap();
        assert!(received.contains(&WsMessage::Text("hello".into())));
        assert!(received.iter().any(WsMessage::is_close));
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_one_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new(tx);
        // Port 9 (discard) is closed on test hosts.
        let url = Url::parse("ws://127.0.0.1:9/ws/gesture").unwrap();
        let _handle = connector.open(SessionSeq::new(7), &url);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.seq, SessionSeq::new(7));
        assert!(matches!(first.event, SocketEvent::Error(_)));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, SocketEvent::Closed { code: None, .. }));
    }

    #[tokio::test]
    async fn detached_session_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = WsConnector::new(tx);
        let url = Url::parse("ws://127.0.0.1:9/ws/gesture").unwrap();
        let mut handle = connector.open(SessionSeq::new(1), &url);
        handle.detach();
        drop(handle);
        drop(connector);

        assert!(rx.recv().await.is_none());
    }
}
