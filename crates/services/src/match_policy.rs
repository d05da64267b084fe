use gestu_core::matching::labels_match;
use gestu_core::model::Lesson;
use tracing::{info, warn};

use crate::correlator::RecognitionResult;
use crate::progress::ProgressStore;

/// What one evaluation of the latest result against the lesson target produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    NoResult,
    Mismatch,
    /// The result matched; `newly_completed` is true only for the first match.
    Matched { newly_completed: bool },
}

impl MatchOutcome {
    #[must_use]
    pub fn is_match(self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Decides whether a recognition result satisfies a lesson.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchPolicy {
    min_confidence: Option<f64>,
}

impl MatchPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require at least `threshold` confidence from model results.
    /// Manual answers and results without a confidence are not gated.
    #[must_use]
    pub fn with_min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = Some(threshold.clamp(0.0, 1.0));
        self
    }

    #[must_use]
    pub fn is_match(&self, result: Option<&RecognitionResult>, target: &str) -> bool {
        let Some(result) = result else {
            return false;
        };
        if let (Some(min), Some(confidence)) = (self.min_confidence, result.confidence) {
            if confidence < min {
                return false;
            }
        }
        labels_match(&result.label, target)
    }

    /// Evaluate and, on the first match, record completion.
    ///
    /// A failed write is logged and reported as not newly completed; the next
    /// matching result retries it.
    pub async fn apply(
        &self,
        result: Option<&RecognitionResult>,
        lesson: &Lesson,
        progress: &ProgressStore,
    ) -> MatchOutcome {
        if result.is_none() {
            return MatchOutcome::NoResult;
        }
        if !self.is_match(result, lesson.target_word()) {
            return MatchOutcome::Mismatch;
        }
        let newly_completed = match progress.mark_lesson(lesson).await {
            Ok(written) => written,
            Err(err) => {
                warn!(lesson = %lesson.completion_key(), error = %err, "failed to record completion");
                false
            }
        };
        if newly_completed {
            info!(lesson = %lesson.completion_key(), "lesson completed");
        }
        MatchOutcome::Matched { newly_completed }
    }
}
