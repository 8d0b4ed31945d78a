use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing and byte counters for one `load()` lifetime, owned and mutated
/// exclusively by the loader instance that created them.
#[derive(Debug, Clone)]
pub struct LoadStats {
    /// Wall-clock stamp of the `load()` call, for reporting.
    pub started_at: DateTime<Utc>,
    /// Monotonic stamp of the `load()` call.
    pub trequest: Instant,
    /// First byte exchange of the current attempt, if any yet.
    pub tfirst: Option<Instant>,
    /// Completion of a successful transfer.
    pub tload: Option<Instant>,
    pub loaded: u64,
    pub total: u64,
    /// Never decreases within one `load()`; resets only on a new `load()`.
    pub retry_count: u32,
    /// One-way latch; once set, no further callback is delivered.
    pub aborted: bool,
}

impl LoadStats {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            trequest: Instant::now(),
            tfirst: None,
            tload: None,
            loaded: 0,
            total: 0,
            retry_count: 0,
            aborted: false,
        }
    }

    /// Per-attempt reset; request-lifetime counters are left alone.
    pub(crate) fn begin_attempt(&mut self) {
        self.tfirst = None;
        self.loaded = 0;
    }

    pub(crate) fn mark_first_byte(&mut self) {
        if self.tfirst.is_none() {
            self.tfirst = Some(Instant::now().max(self.trequest));
        }
    }

    pub(crate) fn mark_loaded(&mut self) {
        let floor = self.tfirst.unwrap_or(self.trequest);
        self.tload = Some(Instant::now().max(floor));
    }

    pub fn time_to_first_byte(&self) -> Option<Duration> {
        self.tfirst.map(|t| t.duration_since(self.trequest))
    }

    pub fn load_duration(&self) -> Option<Duration> {
        self.tload.map(|t| t.duration_since(self.trequest))
    }

    /// Observed throughput between first byte and completion, in bits per
    /// second. `None` until the load finished or when the window is too
    /// short to measure.
    pub fn bandwidth_bps(&self) -> Option<u64> {
        let (tfirst, tload) = (self.tfirst?, self.tload?);
        let secs = tload.duration_since(tfirst).as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        Some((self.loaded as f64 * 8.0 / secs) as u64)
    }
}

/// Serializable summary of one load, derived from [`LoadStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub loaded: u64,
    pub total: u64,
    pub retry_count: u32,
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_bps: Option<u64>,
}

impl LoadReport {
    pub fn from_stats(stats: &LoadStats) -> Self {
        Self {
            started_at: stats.started_at,
            ttfb_ms: stats.time_to_first_byte().map(|d| d.as_millis() as u64),
            duration_ms: stats.load_duration().map(|d| d.as_millis() as u64),
            loaded: stats.loaded,
            total: stats.total,
            retry_count: stats.retry_count,
            aborted: stats.aborted,
            bandwidth_bps: stats.bandwidth_bps(),
        }
    }
}
