use std::time::Duration;

/// Capped exponential reconnect delay.
///
/// `delay(attempt) = min(base × 2^min(attempt, cap_attempt), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    cap_attempt: u32,
}

impl BackoffPolicy {
    pub const DEFAULT_BASE: Duration = Duration::from_millis(500);
    pub const DEFAULT_MAX: Duration = Duration::from_secs(10);
    pub const DEFAULT_CAP_ATTEMPT: u32 = 5;

    /// `max` is raised to `base` if it is smaller.
    #[must_use]
    pub fn new(base: Duration, max: Duration, cap_attempt: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            cap_attempt,
        }
    }

    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    #[must_use]
    pub fn cap_attempt(&self) -> u32 {
        self.cap_attempt
    }

    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(self.cap_attempt).min(31);
        self.base
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_MAX, Self::DEFAULT_CAP_ATTEMPT)
    }
}
