use gestu_core::Message;
use tracing::{debug, trace};

/// Most recent classification shown to the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub label: String,
    pub confidence: Option<f64>,
    pub source: ResultSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Model,
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub results: u64,
    pub heartbeats: u64,
    pub discarded: u64,
}

/// Turns inbound channel text into the latest recognition result.
///
/// Only result messages update state; heartbeats and anything unparsable
/// leave the previous result in place.
#[derive(Debug, Default)]
pub struct ResultCorrelator {
    latest: Option<RecognitionResult>,
    stats: CorrelatorStats,
}

impl ResultCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound text message. Returns the new result when it changed state.
    pub fn ingest(&mut self, raw: &str) -> Option<&RecognitionResult> {
        match Message::decode(raw) {
            Ok(Message::Result { word, confidence }) => {
                if word.trim().is_empty() {
                    self.stats.discarded += 1;
                    debug!("result with empty label discarded");
                    return None;
                }
                self.stats.results += 1;
                self.latest = Some(RecognitionResult {
                    label: word,
                    confidence,
                    source: ResultSource::Model,
                });
                self.latest.as_ref()
            }
            Ok(Message::Ping) => {
                self.stats.heartbeats += 1;
                trace!("heartbeat");
                None
            }
            Ok(Message::Frame { .. }) => {
                self.stats.discarded += 1;
                debug!("unexpected frame message from server");
                None
            }
            Err(err) => {
                self.stats.discarded += 1;
                debug!(error = %err, "inbound message discarded");
                None
            }
        }
    }

    /// Typed-in answer; treated like a result with no confidence.
    pub fn submit_manual(&mut self, word: &str) -> Option<&RecognitionResult> {
        let word = word.trim();
        if word.is_empty() {
            return None;
        }
        self.latest = Some(RecognitionResult {
            label: word.to_string(),
            confidence: None,
            source: ResultSource::Manual,
        });
        self.latest.as_ref()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&RecognitionResult> {
        self.latest.as_ref()
    }

    #[must_use]
    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }
}
