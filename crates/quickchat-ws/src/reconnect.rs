use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client reconnection policy, advertised in the `sessionReady` frame so
/// clients apply an explicit policy instead of library defaults baked into
/// their connection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    /// 1.0 keeps a fixed delay; >1.0 backs off exponentially.
    pub backoff_factor: f64,
}

impl ReconnectPolicy {
    /// Delay before `attempt` (1-based), or `None` once attempts are spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = self.backoff_factor.max(1.0).powi(attempt as i32 - 1);
        Some(Duration::from_millis(
            (self.delay_ms as f64 * factor).round() as u64,
        ))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 1_000,
            backoff_factor: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_until_attempts_are_spent() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.delay_for(6), None);
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn backoff_grows_per_attempt() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            delay_ms: 500,
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(1_000)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(2_000)));
        assert_eq!(policy.delay_for(4), None);
    }
}
