use std::time::{Duration, Instant};

use gestu_core::model::Lesson;
use tracing::{debug, info, warn};

use crate::capture::{CaptureDevice, CaptureLease, CaptureState, FacingMode};
use crate::correlator::{RecognitionResult, ResultCorrelator};
use crate::encoder::{FrameEncoder, TickOutcome};
use crate::error::{CaptureError, ProgressError};
use crate::match_policy::{MatchOutcome, MatchPolicy};
use crate::progress::ProgressStore;
use crate::transport::{SessionEvent, SessionTransport, TransportStatus};

/// Everything a practice view renders, captured at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeSnapshot {
    pub lesson_title: String,
    pub target_word: String,
    pub status: TransportStatus,
    pub status_text: String,
    pub reconnect_in: Option<Duration>,
    pub capture: CaptureState,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub is_match: bool,
    pub completed: bool,
    pub frames_sent: u64,
}

/// One lesson's live practice: capture → encoder → transport → correlator →
/// match policy → progress.
pub struct PracticeSession {
    lesson: Lesson,
    transport: SessionTransport,
    encoder: FrameEncoder,
    correlator: ResultCorrelator,
    policy: MatchPolicy,
    progress: ProgressStore,
    device: Box<dyn CaptureDevice>,
    facing: FacingMode,
    lease: Option<CaptureLease>,
    capture_error: Option<CaptureError>,
    released: bool,
    completed: bool,
    last_match: bool,
}

impl PracticeSession {
    #[must_use]
    pub fn new(
        lesson: Lesson,
        transport: SessionTransport,
        encoder: FrameEncoder,
        progress: ProgressStore,
        device: Box<dyn CaptureDevice>,
    ) -> Self {
        Self {
            lesson,
            transport,
            encoder,
            correlator: ResultCorrelator::new(),
            policy: MatchPolicy::new(),
            progress,
            device,
            facing: FacingMode::User,
            lease: None,
            capture_error: None,
            released: false,
            completed: false,
            last_match: false,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Acquire the camera, read completion state and open the first session.
    pub async fn start(&mut self) {
        self.acquire_capture();
        self.completed = self.progress.is_completed(&self.lesson).await;
        info!(lesson = %self.lesson.completion_key(), completed = self.completed, "practice started");
        self.transport.connect(false);
    }

    /// Release capture and terminate the transport. Idempotent.
    pub fn shutdown(&mut self) {
        self.transport.shutdown();
        if let Some(mut lease) = self.lease.take() {
            lease.release();
        }
        self.released = true;
    }

    /// View hidden: close with "going away" and stop reconnecting.
    pub fn hide(&mut self) {
        self.transport.suspend();
        self.encoder.reset();
    }

    /// View visible again: reconnect now and pick up progress written meanwhile.
    pub async fn show(&mut self) {
        self.transport.resume();
        self.refresh_progress().await;
    }

    pub fn reconnect(&mut self) {
        self.transport.manual_reconnect();
    }

    /// Drop any failed or stale capture and ask the device again.
    pub fn retry_capture(&mut self) {
        if self.transport.status() == TransportStatus::Terminated {
            return;
        }
        if let Some(mut lease) = self.lease.take() {
            lease.release();
        }
        self.released = false;
        self.acquire_capture();
    }

    fn acquire_capture(&mut self) {
        if self.released || self.lease.is_some() {
            return;
        }
        match CaptureLease::acquire(self.device.as_mut(), self.facing) {
            Ok(lease) => {
                self.lease = Some(lease);
                self.capture_error = None;
            }
            Err(err) => {
                warn!(error = %err, "camera unavailable");
                self.capture_error = Some(err);
            }
        }
    }

    // ─── Driving ────────────────────────────────────────────────────────────

    /// Frame clock tick: maybe send one frame.
    pub fn on_frame_tick(&mut self, now: Instant) -> TickOutcome {
        let source = self.lease.as_mut().and_then(CaptureLease::source_mut);
        self.encoder.tick(now, source, &mut self.transport)
    }

    /// Reconnect deadline check. Returns whether a reconnect was started.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        self.transport.on_timer(now)
    }

    /// Apply a socket event; inbound results are evaluated against the lesson.
    pub async fn on_socket_event(&mut self, event: SessionEvent, now: Instant) -> Option<MatchOutcome> {
        let text = self.transport.handle_event(event, now)?;
        let result = self.correlator.ingest(&text)?.clone();
        Some(self.evaluate(&result).await)
    }

    /// Typed answer, evaluated like a classifier result.
    pub async fn submit_manual(&mut self, word: &str) -> Option<MatchOutcome> {
        let result = self.correlator.submit_manual(word)?.clone();
        Some(self.evaluate(&result).await)
    }

    /// Flip the lesson's completion by hand. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the write fails.
    pub async fn toggle_completion(&mut self) -> Result<bool, ProgressError> {
        self.completed = self.progress.toggle_lesson(&self.lesson).await?;
        Ok(self.completed)
    }

    /// Re-read completion from storage, e.g. after another handle wrote it.
    pub async fn refresh_progress(&mut self) {
        let completed = self.progress.is_completed(&self.lesson).await;
        if completed != self.completed {
            debug!(completed, "completion changed externally");
        }
        self.completed = completed;
    }

    async fn evaluate(&mut self, result: &RecognitionResult) -> MatchOutcome {
        let outcome = self
            .policy
            .apply(Some(result), &self.lesson, &self.progress)
            .await;
        self.last_match = outcome.is_match();
        if outcome.is_match() {
            self.completed = self.progress.is_completed(&self.lesson).await;
        }
        outcome
    }

    // ─── Observers ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    #[must_use]
    pub fn transport(&self) -> &SessionTransport {
        &self.transport
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    #[must_use]
    pub fn correlator(&self) -> &ResultCorrelator {
        &self.correlator
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn capture_state(&self) -> CaptureState {
        if self.released {
            CaptureState::Released
        } else if let Some(err) = &self.capture_error {
            CaptureState::Failed(err.clone())
        } else if self.lease.as_ref().is_some_and(CaptureLease::is_ready) {
            CaptureState::Ready
        } else {
            CaptureState::Searching
        }
    }

    #[must_use]
    pub fn snapshot(&self, now: Instant) -> PracticeSnapshot {
        let latest = self.correlator.latest();
        // Tenths of a second are enough for display and keep snapshots stable between ticks.
        let reconnect_in = self
            .transport
            .reconnect_in(now)
            .map(|delay| Duration::from_millis((delay.as_millis().div_ceil(100) * 100) as u64));
        PracticeSnapshot {
            lesson_title: self.lesson.title().to_string(),
            target_word: self.lesson.target_word().to_string(),
            status: self.transport.status(),
            status_text: self.status_text(reconnect_in),
            reconnect_in,
            capture: self.capture_state(),
            label: latest.map(|result| result.label.clone()),
            confidence: latest.and_then(|result| result.confidence),
            is_match: self.last_match,
            completed: self.completed,
            frames_sent: self.encoder.stats().sent,
        }
    }

    fn status_text(&self, reconnect_in: Option<Duration>) -> String {
        let transport = &self.transport;
        match transport.status() {
            TransportStatus::Connecting => "Connecting…".to_string(),
            TransportStatus::Connected => "Connected".to_string(),
            TransportStatus::Terminated => "Closed".to_string(),
            TransportStatus::Disconnected if !transport.is_foreground() => {
                "Paused (view hidden)".to_string()
            }
            TransportStatus::Disconnected => match reconnect_in {
                Some(delay) => format!("Reconnecting in {:.1}s", delay.as_secs_f64()),
                None => "Disconnected".to_string(),
            },
        }
    }
}

impl Drop for PracticeSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use gestu_core::model::{CategorySlug, LessonDraft};
    use storage::repository::InMemoryStore;
    use url::Url;

    use super::*;
    use crate::capture::fake::FakeDevice;
    use crate::transport::fake::FakeConnector;
    use crate::transport::{SessionSeq, SocketEvent};

    fn lesson() -> Lesson {
        LessonDraft::new(CategorySlug::new("words").unwrap(), 1, "А")
            .validate()
            .unwrap()
    }

    fn session(device: FakeDevice) -> (PracticeSession, FakeConnector, ProgressStore) {
        let connector = FakeConnector::default();
        let url = Url::parse("ws://127.0.0.1:8000/ws/gesture").unwrap();
        let transport = SessionTransport::new(url, Box::new(connector.clone()));
        let progress = ProgressStore::new(Arc::new(InMemoryStore::new()));
        let session = PracticeSession::new(
            lesson(),
            transport,
            FrameEncoder::new(15, 32, 50),
            progress.clone(),
            Box::new(device),
        );
        (session, connector, progress)
    }

    fn event(seq: u64, event: SocketEvent) -> SessionEvent {
        SessionEvent::new(SessionSeq::new(seq), event)
    }

    #[tokio::test]
    async fn matching_result_completes_once() {
        let (mut practice, _, progress) = session(FakeDevice::working(64, 48));
        let now = Instant::now();
        practice.start().await;
        practice
            .on_socket_event(event(1, SocketEvent::Opened), now)
            .await;

        let hit = SocketEvent::Message(r#"{"kind":"result","word":"а","confidence":0.92}"#.into());
        let first = practice.on_socket_event(event(1, hit.clone()), now).await;
        assert_eq!(
            first,
            Some(MatchOutcome::Matched {
                newly_completed: true
            })
        );
        let second = practice.on_socket_event(event(1, hit), now).await;
        assert_eq!(
            second,
            Some(MatchOutcome::Matched {
                newly_completed: false
            })
        );
        assert_eq!(progress.load().await.len(), 1);

        let snapshot = practice.snapshot(now);
        assert!(snapshot.is_match);
        assert!(snapshot.completed);
        assert_eq!(snapshot.label.as_deref(), Some("а"));
        assert_eq!(snapshot.confidence, Some(0.92));
    }

    #[tokio::test]
    async fn frames_flow_only_while_connected() {
        let (mut practice, connector, _) = session(FakeDevice::working(64, 48));
        let now = Instant::now();
        practice.start().await;
        assert!(matches!(
            practice.on_frame_tick(now),
            TickOutcome::NotWritable
        ));
        practice
            .on_socket_event(event(1, SocketEvent::Opened), now)
            .await;
        assert!(matches!(
            practice.on_frame_tick(now),
            TickOutcome::Sent { .. }
        ));
        let sent = connector.last().lock().unwrap().sent.clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("data:image/jpeg;base64,"));

        practice.hide();
        assert!(matches!(
            practice.on_frame_tick(now + Duration::from_secs(1)),
            TickOutcome::NotWritable
        ));
        assert_eq!(practice.snapshot(now).status_text, "Paused (view hidden)");
    }

    #[tokio::test]
    async fn capture_failure_is_state_not_error() {
        let (mut practice, connector, _) = session(FakeDevice::failing(CaptureError::NotFound));
        let now = Instant::now();
        practice.start().await;
        assert_eq!(
            practice.capture_state(),
            CaptureState::Failed(CaptureError::NotFound)
        );
        assert_eq!(connector.opened(), 1, "transport still runs");
        practice
            .on_socket_event(event(1, SocketEvent::Opened), now)
            .await;
        assert!(matches!(practice.on_frame_tick(now), TickOutcome::NotReady));
    }

    #[tokio::test]
    async fn shutdown_releases_capture_once() {
        let device = FakeDevice::working(64, 48);
        let released = Arc::clone(&device.released);
        let (mut practice, _, _) = session(device);
        practice.start().await;
        assert_eq!(practice.capture_state(), CaptureState::Ready);
        practice.shutdown();
        drop(practice);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn manual_answer_and_toggle() {
        let (mut practice, _, progress) = session(FakeDevice::working(64, 48));
        practice.start().await;
        assert_eq!(
            practice.submit_manual("б").await,
            Some(MatchOutcome::Mismatch)
        );
        assert_eq!(
            practice.submit_manual(" А ").await,
            Some(MatchOutcome::Matched {
                newly_completed: true
            })
        );
        assert!(!practice.toggle_completion().await.unwrap());
        assert!(progress.load().await.is_empty());
        assert!(practice.toggle_completion().await.unwrap());
    }

    #[tokio::test]
    async fn external_completion_is_picked_up() {
        let (mut practice, _, progress) = session(FakeDevice::working(64, 48));
        practice.start().await;
        assert!(!practice.is_completed());
        progress.mark_lesson(practice.lesson()).await.unwrap();
        practice.refresh_progress().await;
        assert!(practice.is_completed());
    }
}
