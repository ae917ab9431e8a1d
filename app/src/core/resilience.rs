use crate::core::time::Duration;

/// Doubling delay per attempt, clamped to `[min_delay, max_delay]`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    attempts: u32,
    base_delay: Duration,
    min_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self::bounded(base_delay, base_delay, max_delay)
    }

    pub fn bounded(base_delay: Duration, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: 0,
            base_delay,
            min_delay,
            max_delay,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn next_delay(&self) -> Duration {
        let base = self.base_delay.as_millis();
        let multiplier = 2i64.saturating_pow(self.attempts.min(31));
        let delay = base
            .saturating_mul(multiplier)
            .min(self.max_delay.as_millis())
            .max(self.min_delay.as_millis());
        Duration::millis(delay)
    }

    pub fn bump(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
