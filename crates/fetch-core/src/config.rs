use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::transport::TransportAdapter;

/// Per-request customization hook, invoked with the freshly opened adapter
/// and the request URL before every send.
pub type TransportSetup = Arc<dyn Fn(&mut TransportAdapter, &str) + Send + Sync>;

/// Configuration for one `load()` call.
#[derive(Clone)]
pub struct LoadConfig {
    /// Liveness window: elapsed time without a byte exchange before a timeout
    /// is reported (default: 10s).
    pub timeout: Duration,
    /// Delay before the first retry; doubled on each subsequent retry.
    pub retry_delay: Duration,
    /// Maximum number of retries before a recoverable failure is surfaced.
    pub max_retry: u32,
    /// Upper bound for the exponential backoff delay.
    pub max_retry_delay: Duration,
    pub transport_setup: Option<TransportSetup>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_millis(1000),
            max_retry: 3,
            max_retry_delay: Duration::from_secs(64),
            transport_setup: None,
        }
    }
}

impl LoadConfig {
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_retry_delay(mut self, ms: u64) -> Self {
        self.retry_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_max_retry(mut self, max: u32) -> Self {
        self.max_retry = max;
        self
    }

    pub fn with_max_retry_delay(mut self, ms: u64) -> Self {
        self.max_retry_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_transport_setup(mut self, setup: TransportSetup) -> Self {
        self.transport_setup = Some(setup);
        self
    }

    /// Exponential backoff step: `min(2 * current, max_retry_delay)`.
    pub fn next_retry_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_retry_delay)
    }
}

impl fmt::Debug for LoadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadConfig")
            .field("timeout", &self.timeout)
            .field("retry_delay", &self.retry_delay)
            .field("max_retry", &self.max_retry)
            .field("max_retry_delay", &self.max_retry_delay)
            .field("transport_setup", &self.transport_setup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = LoadConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.max_retry_delay, Duration::from_secs(64));
        assert!(config.transport_setup.is_none());
    }

    #[test]
    fn builders_override_defaults() {
        let config = LoadConfig::default()
            .with_timeout(2500)
            .with_retry_delay(100)
            .with_max_retry(5)
            .with_max_retry_delay(800);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.retry_delay, Duration::from_millis(100));
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.max_retry_delay, Duration::from_millis(800));
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let config = LoadConfig::default()
            .with_retry_delay(500)
            .with_max_retry_delay(3000);
        let mut delay = config.retry_delay;
        let mut observed = Vec::new();
        for _ in 0..5 {
            observed.push(delay.as_millis());
            delay = config.next_retry_delay(delay);
        }
        assert_eq!(observed, vec![500, 1000, 2000, 3000, 3000]);
    }
}
