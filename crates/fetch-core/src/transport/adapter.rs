use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use super::{
    ReadyState, ReadyStateCell, ResponseKind, Transport, TransportError, TransportEvent,
    TransportProvider, TransportRequest,
};

/// Uniform wrapper over the two transport variants.
///
/// The variant is selected once, at `open()` time, by URL scheme; headers and
/// the response kind are buffered and applied when `send()` dispatches the
/// request through the selected variant.
pub struct TransportAdapter {
    variant: Arc<dyn Transport>,
    request: TransportRequest,
    ready_state: ReadyStateCell,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("request", &self.request)
            .field("ready_state", &self.ready_state)
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl TransportAdapter {
    /// Selects a transport variant for `url` and prepares a request. The
    /// variant is fixed for the adapter's lifetime.
    pub fn open(
        method: &str,
        url: &str,
        provider: &dyn TransportProvider,
    ) -> Result<Self, TransportError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let variant = provider.provide(&parsed);
        let ready_state = ReadyStateCell::new();
        ready_state.set(ReadyState::Opened);
        Ok(Self {
            variant,
            request: TransportRequest {
                method: method.to_ascii_uppercase(),
                url: url.to_string(),
                headers: Vec::new(),
                response_kind: ResponseKind::Binary,
            },
            ready_state,
            task: None,
        })
    }

    /// Buffers a header; applied at send time. On the direct variant headers
    /// are best-effort and may be ignored by the transport.
    pub fn set_request_header(&mut self, name: &str, value: &str) {
        self.request
            .headers
            .push((name.to_string(), value.to_string()));
    }

    pub fn set_response_kind(&mut self, kind: ResponseKind) {
        self.request.response_kind = kind;
    }

    pub fn response_kind(&self) -> ResponseKind {
        self.request.response_kind
    }

    /// Ready state of the active transfer, proxied from whichever variant is
    /// driving it.
    pub fn ready_state(&self) -> ReadyState {
        self.ready_state.get()
    }

    /// Dispatches the buffered request through the selected variant and hands
    /// back the normalized event stream.
    pub fn send(&mut self) -> UnboundedReceiver<TransportEvent> {
        let (tx, rx) = unbounded_channel();
        let variant = Arc::clone(&self.variant);
        let request = self.request.clone();
        let state = self.ready_state.clone();
        debug!(url = %self.request.url, method = %self.request.method, "Dispatching request");
        self.task = Some(tokio::spawn(async move {
            variant.perform(request, state, tx).await;
        }));
        rx
    }

    /// Idempotent; safe to call with no in-flight transfer. Cancelling drops
    /// the event sender, so consumers observe a closed channel.
    pub fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.ready_state.set(ReadyState::Done);
        }
    }

    /// Aborts and releases all buffered request state.
    pub fn destroy(&mut self) {
        self.abort();
        self.request.headers.clear();
    }
}

impl Drop for TransportAdapter {
    fn drop(&mut self) {
        self.abort();
    }
}
