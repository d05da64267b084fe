use std::time::Duration;

use gestu_core::model::{Lesson, ProgressSet};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, watch};
use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::session::{PracticeSession, PracticeSnapshot};
use crate::capture::CaptureDevice;
use crate::config::ClientConfig;
use crate::encoder::FrameEncoder;
use crate::progress::{ProgressStore, ProgressWatcher};
use crate::transport::{SessionEvent, SessionTransport, WsConnector};

/// Driving clock for the frame pacer; the pacer caps the actual send rate.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

const CONTROL_CAPACITY: usize = 16;

/// User intents delivered to a running practice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Hide,
    Show,
    Reconnect,
    ToggleCompletion,
    Manual(String),
    RetryCapture,
    Shutdown,
}

/// Caller side of a running practice.
#[derive(Clone)]
pub struct PracticeHandle {
    controls: mpsc::Sender<ControlCommand>,
    snapshots: watch::Receiver<PracticeSnapshot>,
}

impl PracticeHandle {
    /// Deliver a command. Returns `false` once the runtime has stopped.
    pub async fn send(&self, command: ControlCommand) -> bool {
        self.controls.send(command).await.is_ok()
    }

    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<PracticeSnapshot> {
        self.snapshots.clone()
    }

    #[must_use]
    pub fn latest(&self) -> PracticeSnapshot {
        self.snapshots.borrow().clone()
    }
}

/// Runs one practice on a single task: socket events, the frame clock, the
/// reconnect deadline, progress changes and control commands.
pub struct PracticeRuntime {
    session: PracticeSession,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    controls: mpsc::Receiver<ControlCommand>,
    snapshots: watch::Sender<PracticeSnapshot>,
    progress_changes: Option<ProgressWatcher>,
}

impl PracticeRuntime {
    /// `events` must be the receiving end the session's connector emits into.
    #[must_use]
    pub fn new(
        session: PracticeSession,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> (Self, PracticeHandle) {
        let (controls_tx, controls) = mpsc::channel(CONTROL_CAPACITY);
        let (snapshots, snapshots_rx) = watch::channel(session.snapshot(Instant::now().into_std()));
        let progress_changes = Some(session.progress().watch());
        let runtime = Self {
            session,
            events,
            controls,
            snapshots,
            progress_changes,
        };
        let handle = PracticeHandle {
            controls: controls_tx,
            snapshots: snapshots_rx,
        };
        (runtime, handle)
    }

    /// Practice against the configured inference endpoint over WebSocket.
    #[must_use]
    pub fn websocket(
        config: &ClientConfig,
        lesson: Lesson,
        progress: ProgressStore,
        device: Box<dyn CaptureDevice>,
    ) -> (Self, PracticeHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = SessionTransport::new(
            config.inference_url().clone(),
            Box::new(WsConnector::new(events_tx)),
        )
        .with_backoff(config.backoff())
        .with_backlog_limit(config.backlog_bytes());
        let session = PracticeSession::new(
            lesson,
            transport,
            FrameEncoder::from_config(config),
            progress,
            device,
        );
        Self::new(session, events_rx)
    }

    /// Run until `Shutdown` or until every handle is dropped. Returns the
    /// final snapshot.
    pub async fn run(mut self) -> PracticeSnapshot {
        self.session.start().await;
        self.publish();

        let mut ticker = time::interval(DEFAULT_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.session.transport().next_deadline();
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now().into_std();
                    self.session.on_timer(now);
                    self.frame_tick(now);
                }
                () = sleep_until(deadline) => {
                    self.session.on_timer(Instant::now().into_std());
                }
                Some(event) = self.events.recv() => {
                    self.session.on_socket_event(event, Instant::now().into_std()).await;
                }
                changed = next_change(&mut self.progress_changes) => match changed {
                    Some(_) => self.session.refresh_progress().await,
                    None => self.progress_changes = None,
                },
                command = self.controls.recv() => match command {
                    None | Some(ControlCommand::Shutdown) => break,
                    Some(command) => self.apply(command).await,
                },
            }
            self.publish();
        }

        self.session.shutdown();
        self.publish();
        info!("practice stopped");
        self.snapshots.borrow().clone()
    }

    async fn apply(&mut self, command: ControlCommand) {
        debug!(?command, "control command");
        match command {
            ControlCommand::Hide => self.session.hide(),
            ControlCommand::Show => self.session.show().await,
            ControlCommand::Reconnect => self.session.reconnect(),
            ControlCommand::ToggleCompletion => {
                if let Err(err) = self.session.toggle_completion().await {
                    warn!(error = %err, "failed to toggle completion");
                }
            }
            ControlCommand::Manual(word) => {
                self.session.submit_manual(&word).await;
            }
            ControlCommand::RetryCapture => self.session.retry_capture(),
            ControlCommand::Shutdown => {}
        }
    }

    /// Encoding a large frame takes milliseconds; on a multi-threaded runtime
    /// other tasks are moved off this worker while it runs.
    fn frame_tick(&mut self, now: std::time::Instant) {
        match Handle::current().runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                task::block_in_place(|| self.session.on_frame_tick(now));
            }
            _ => {
                self.session.on_frame_tick(now);
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot(Instant::now().into_std());
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => time::sleep_until(Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn next_change(watcher: &mut Option<ProgressWatcher>) -> Option<ProgressSet> {
    match watcher {
        Some(watcher) => watcher.changed().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gestu_core::model::{CategorySlug, LessonDraft};
    use storage::repository::InMemoryStore;
    use url::Url;

    use super::*;
    use crate::capture::fake::FakeDevice;
    use crate::transport::fake::FakeConnector;
    use crate::transport::{SessionSeq, SocketEvent, TransportStatus};

    fn runtime() -> (PracticeRuntime, PracticeHandle, mpsc::UnboundedSender<SessionEvent>, FakeConnector) {
        let connector = FakeConnector::default();
        let url = Url::parse("ws://127.0.0.1:8000/ws/gesture").unwrap();
        let transport = SessionTransport::new(url, Box::new(connector.clone()));
        let lesson = LessonDraft::new(CategorySlug::new("animals").unwrap(), 1, "Кошка")
            .validate()
            .unwrap();
        let session = PracticeSession::new(
            lesson,
            transport,
            FrameEncoder::new(15, 32, 50),
            ProgressStore::new(Arc::new(InMemoryStore::new())),
            Box::new(FakeDevice::working(64, 48)),
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (runtime, handle) = PracticeRuntime::new(session, events_rx);
        (runtime, handle, events_tx, connector)
    }

    #[tokio::test(start_paused = true)]
    async fn commands_drive_the_session() {
        let (runtime, handle, events, connector) = runtime();
        let task = tokio::spawn(runtime.run());
        let mut snapshots = handle.snapshots();

        events
            .send(SessionEvent::new(SessionSeq::new(1), SocketEvent::Opened))
            .unwrap();
        snapshots
            .wait_for(|s| s.status == TransportStatus::Connected)
            .await
            .unwrap();
        snapshots.wait_for(|s| s.frames_sent > 0).await.unwrap();
        assert!(!connector.last().lock().unwrap().sent.is_empty());

        assert!(handle.send(ControlCommand::Manual("кошка".into())).await);
        snapshots.wait_for(|s| s.completed && s.is_match).await.unwrap();

        assert!(handle.send(ControlCommand::Hide).await);
        snapshots
            .wait_for(|s| s.status == TransportStatus::Disconnected)
            .await
            .unwrap();

        assert!(handle.send(ControlCommand::Shutdown).await);
        let last = task.await.unwrap();
        assert_eq!(last.status, TransportStatus::Terminated);
        assert!(!handle.send(ControlCommand::Show).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn frames_flow_on_multi_thread_runtime() {
        let (runtime, handle, events, connector) = runtime();
        let task = tokio::spawn(runtime.run());
        let mut snapshots = handle.snapshots();

        events
            .send(SessionEvent::new(SessionSeq::new(1), SocketEvent::Opened))
            .unwrap();
        snapshots.wait_for(|s| s.frames_sent >= 2).await.unwrap();
        assert!(connector.last().lock().unwrap().sent.len() >= 2);

        assert!(handle.send(ControlCommand::Shutdown).await);
        let last = task.await.unwrap();
        assert_eq!(last.status, TransportStatus::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_reconnect_fires_on_deadline() {
        let (runtime, handle, events, connector) = runtime();
        let task = tokio::spawn(runtime.run());
        let mut snapshots = handle.snapshots();

        events
            .send(SessionEvent::new(SessionSeq::new(1), SocketEvent::Opened))
            .unwrap();
        snapshots
            .wait_for(|s| s.status == TransportStatus::Connected)
            .await
            .unwrap();
        events
            .send(SessionEvent::new(
                SessionSeq::new(1),
                SocketEvent::Closed {
                    code: Some(1006),
                    reason: String::new(),
                },
            ))
            .unwrap();
        snapshots
            .wait_for(|s| s.status == TransportStatus::Disconnected && s.reconnect_in.is_some())
            .await
            .unwrap();
        snapshots
            .wait_for(|s| s.status == TransportStatus::Connecting)
            .await
            .unwrap();
        assert_eq!(connector.opened(), 2);

        assert!(handle.send(ControlCommand::Shutdown).await);
        task.await.unwrap();
    }
}
