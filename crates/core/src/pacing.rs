use std::time::{Duration, Instant};

/// Caps how often frames are emitted, independent of how fast the driving
/// clock ticks.
///
/// Deadlines advance by a fixed interval from the previous deadline, so a
/// 60 Hz clock feeding a 15 fps pacer yields 15 emissions per second rather
/// than drifting down to the next multiple of the tick period. After a stall
/// the schedule restarts from the current tick instead of bursting to catch up.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FramePacer {
    /// `fps` of zero is treated as one.
    #[must_use]
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            next_due: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a frame may be emitted at `now`. Does not consume the slot.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    /// Record an emission at `now`.
    pub fn mark_sent(&mut self, now: Instant) {
        let next = match self.next_due {
            Some(due) if now >= due => due + self.interval,
            _ => now + self.interval,
        };
        self.next_due = Some(if next <= now { now + self.interval } else { next });
    }

    /// Claim the slot if due; returns whether the caller may emit.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.mark_sent(now);
            true
        } else {
            false
        }
    }

    /// Forget the schedule, e.g. after the stream was paused.
    pub fn reset(&mut self) {
        self.next_due = None;
    }
}
