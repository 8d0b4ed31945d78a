mod segment;

pub use segment::SegmentLoader;

use serde::{Deserialize, Serialize};

use crate::stats::LoadStats;
use crate::transport::{ResponseBody, ResponseKind};

/// Describes one fragment fetch. Immutable for one attempt; range fields are
/// present only for partial fetches.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub url: String,
    pub range_start: Option<u64>,
    pub range_end: Option<u64>,
    pub response_kind: ResponseKind,
}

impl LoadContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            range_start: None,
            range_end: None,
            response_kind: ResponseKind::Binary,
        }
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.range_start = Some(start);
        self.range_end = Some(end);
        self
    }

    pub fn with_response_kind(mut self, kind: ResponseKind) -> Self {
        self.response_kind = kind;
        self
    }

    /// `Range: bytes=<start>-<end - 1>`, armed only when `range_end` is set.
    pub(crate) fn range_header(&self) -> Option<String> {
        self.range_end
            .map(|end| format!("bytes={}-{}", self.range_start.unwrap_or(0), end.saturating_sub(1)))
    }
}

/// Response envelope delivered to `on_success`. `url` is the resolved
/// response URL after any redirects.
#[derive(Debug, Clone)]
pub struct LoadResponse {
    pub url: String,
    pub data: ResponseBody,
}

/// Terminal failure descriptor delivered to `on_error`. `code` is the HTTP
/// status, or 0 for network-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub code: u16,
    pub text: String,
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.text)
    }
}

/// Lifecycle of a loader instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderState {
    Idle,
    Loading,
    Success,
    Error,
    TimedOut,
    RetryScheduled,
    Destroyed,
}

impl LoaderState {
    /// After a reported timeout the transfer keeps running, so `TimedOut`
    /// can still resolve to a terminal outcome or a retry. Abort resets a
    /// live loader back to `Idle` for reuse.
    pub fn can_transition_to(self, target: LoaderState) -> bool {
        use LoaderState::*;
        match (self, target) {
            (Destroyed, _) => false,
            (_, Destroyed) => true,
            (Idle | Success | Error | TimedOut | RetryScheduled, Loading) => true,
            (Loading, Success | Error | TimedOut | RetryScheduled) => true,
            (TimedOut, Success | Error | RetryScheduled) => true,
            (Loading | TimedOut | RetryScheduled, Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LoaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::RetryScheduled => write!(f, "retry_scheduled"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

pub type SuccessHandler = Box<dyn Fn(LoadResponse, &LoadStats, &LoadContext) + Send + Sync>;
pub type ErrorHandler = Box<dyn Fn(LoadFailure, &LoadContext) + Send + Sync>;
pub type TimeoutHandler = Box<dyn Fn(&LoadStats, &LoadContext) + Send + Sync>;
pub type ProgressHandler = Box<dyn Fn(&LoadStats, &LoadContext) + Send + Sync>;

/// Callback bundle supplied to `load()`. All load outcomes are delivered
/// through these; nothing propagates as a fault across the boundary.
pub struct LoaderCallbacks {
    pub on_success: SuccessHandler,
    pub on_error: ErrorHandler,
    pub on_timeout: TimeoutHandler,
    pub on_progress: Option<ProgressHandler>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_header_formats_inclusive_end() {
        let context = LoadContext::new("https://cdn.example.com/seg_1.ts").with_range(100, 200);
        assert_eq!(context.range_header().as_deref(), Some("bytes=100-199"));
    }

    #[test]
    fn range_header_absent_without_range_end() {
        let context = LoadContext::new("https://cdn.example.com/seg_1.ts");
        assert!(context.range_header().is_none());
    }

    #[test]
    fn range_header_defaults_start_to_zero() {
        let mut context = LoadContext::new("https://cdn.example.com/seg_1.ts");
        context.range_end = Some(64);
        assert_eq!(context.range_header().as_deref(), Some("bytes=0-63"));
    }

    #[test]
    fn valid_state_transitions() {
        use LoaderState::*;
        assert!(Idle.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Success));
        assert!(Loading.can_transition_to(Error));
        assert!(Loading.can_transition_to(TimedOut));
        assert!(Loading.can_transition_to(RetryScheduled));
        assert!(RetryScheduled.can_transition_to(Loading));
        assert!(TimedOut.can_transition_to(Success));
        assert!(TimedOut.can_transition_to(RetryScheduled));
        assert!(Success.can_transition_to(Loading));
        assert!(Error.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Idle));
        assert!(Error.can_transition_to(Destroyed));
    }

    #[test]
    fn invalid_state_transitions() {
        use LoaderState::*;
        assert!(!Loading.can_transition_to(Loading));
        assert!(!Idle.can_transition_to(Success));
        assert!(!Idle.can_transition_to(TimedOut));
        assert!(!Success.can_transition_to(Error));
        assert!(!Destroyed.can_transition_to(Loading));
        assert!(!Destroyed.can_transition_to(Idle));
        assert!(!Success.can_transition_to(Idle));
    }

    #[test]
    fn failure_display() {
        let failure = LoadFailure {
            code: 503,
            text: "Service Unavailable".to_string(),
        };
        assert_eq!(failure.to_string(), "503 Service Unavailable");
    }
}
