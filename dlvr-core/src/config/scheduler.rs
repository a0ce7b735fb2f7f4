use std::time::Duration;

/// Lifecycle scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Wall-clock length of one simulated minute.
    pub minute: Duration,
}

impl SchedulerConfig {
    /// Wall-clock duration of `minutes` simulated minutes.
    pub fn span(&self, minutes: f64) -> Duration {
        self.minute.mul_f64(minutes.max(0.0))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            minute: Duration::from_secs(60),
        }
    }
}
