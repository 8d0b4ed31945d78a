mod adapter;
mod direct;
mod http;

pub use adapter::TransportAdapter;
pub use direct::DirectTransport;
pub use http::HttpTransport;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// Transfer progress, mirrored uniformly across transport variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Opened,
            2 => Self::HeadersReceived,
            3 => Self::Loading,
            4 => Self::Done,
            _ => Self::Unsent,
        }
    }
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsent => write!(f, "unsent"),
            Self::Opened => write!(f, "opened"),
            Self::HeadersReceived => write!(f, "headers_received"),
            Self::Loading => write!(f, "loading"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Shared ready-state slot updated by the active transfer and proxied by the
/// adapter regardless of which variant is driving it.
#[derive(Debug, Clone)]
pub struct ReadyStateCell(Arc<AtomicU8>);

impl ReadyStateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ReadyState::Unsent as u8)))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

impl Default for ReadyStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// How the payload of a completed transfer is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Binary,
    Text,
}

/// Payload of a completed transfer.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    Binary(Bytes),
    Text(String),
}

impl ResponseBody {
    /// Payload length: byte length for binary bodies, character count for text.
    pub fn len(&self) -> u64 {
        match self {
            Self::Binary(b) => b.len() as u64,
            Self::Text(s) => s.chars().count() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Binary(b) => b,
            Self::Text(s) => s.as_bytes(),
        }
    }
}

/// Buffered request state, fixed at `send()` time.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub response_kind: ResponseKind,
}

/// Fully-typed result of a finished transfer. The transport-specific
/// "final URL" is always aliased into `resolved_url`.
#[derive(Debug, Clone)]
pub struct TransportResult {
    pub status: u16,
    pub status_text: String,
    pub resolved_url: String,
    pub body: ResponseBody,
}

/// Normalized transfer notification, identical in shape for every variant.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    HeadersReceived {
        status: u16,
        status_text: String,
        resolved_url: String,
        total: Option<u64>,
    },
    Progress {
        loaded: u64,
        /// Present only when the transfer length is computable.
        total: Option<u64>,
    },
    Done(TransportResult),
    /// Network-level failure with no HTTP status.
    Failed(TransportError),
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Local read failed for {url}: {reason}")]
    Local { url: String, reason: String },
}

pub type EventSender = UnboundedSender<TransportEvent>;

/// One transport variant capable of executing a buffered request.
///
/// Implementations run the whole transfer, bumping `state` and emitting
/// normalized events as it progresses. The future resolves when the transfer
/// is over; cancellation happens by dropping it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: TransportRequest, state: ReadyStateCell, events: EventSender);
}

/// Chooses the transport variant for a URL. Injected into the loader so tests
/// can substitute scripted transports.
pub trait TransportProvider: Send + Sync {
    fn provide(&self, url: &Url) -> Arc<dyn Transport>;
}

/// Schemes that carry local, blob-style content and bypass the network stack.
pub(crate) fn is_local_scheme(scheme: &str) -> bool {
    matches!(scheme, "file" | "data")
}

/// Default provider: `file:`/`data:` URLs go to the direct variant, every
/// other scheme to the privileged HTTP variant. The choice is the single
/// dispatch point; once an adapter is opened the variant never changes.
pub struct DefaultTransportProvider {
    http: Arc<HttpTransport>,
    direct: Arc<DirectTransport>,
}

impl DefaultTransportProvider {
    pub fn new() -> Self {
        Self::with_client(HttpTransport::build_client())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            http: Arc::new(HttpTransport::with_client(client)),
            direct: Arc::new(DirectTransport::new()),
        }
    }
}

impl Default for DefaultTransportProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportProvider for DefaultTransportProvider {
    fn provide(&self, url: &Url) -> Arc<dyn Transport> {
        if is_local_scheme(url.scheme()) {
            Arc::clone(&self.direct) as Arc<dyn Transport>
        } else {
            Arc::clone(&self.http) as Arc<dyn Transport>
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_roundtrip() {
        for state in [
            ReadyState::Unsent,
            ReadyState::Opened,
            ReadyState::HeadersReceived,
            ReadyState::Loading,
            ReadyState::Done,
        ] {
            assert_eq!(ReadyState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn ready_state_ordering() {
        assert!(ReadyState::HeadersReceived < ReadyState::Done);
        assert!(ReadyState::Opened < ReadyState::Loading);
    }

    #[test]
    fn ready_state_cell_starts_unsent() {
        let cell = ReadyStateCell::new();
        assert_eq!(cell.get(), ReadyState::Unsent);
        cell.set(ReadyState::Loading);
        assert_eq!(cell.get(), ReadyState::Loading);
    }

    #[test]
    fn body_len_binary_counts_bytes() {
        let body = ResponseBody::Binary(Bytes::from_static(&[0u8; 16]));
        assert_eq!(body.len(), 16);
        assert!(!body.is_empty());
    }

    #[test]
    fn body_len_text_counts_characters() {
        // Three characters, six bytes in UTF-8.
        let body = ResponseBody::Text("aé語".to_string());
        assert_eq!(body.len(), 3);
        assert_eq!(body.as_bytes().len(), 6);
    }

    #[test]
    fn local_schemes() {
        assert!(is_local_scheme("file"));
        assert!(is_local_scheme("data"));
        assert!(!is_local_scheme("http"));
        assert!(!is_local_scheme("https"));
        assert!(!is_local_scheme("blob"));
    }
}
