use futures::StreamExt;
use reqwest::{Client, Method};
use tracing::debug;

use super::{
    EventSender, ReadyState, ReadyStateCell, ResponseBody, ResponseKind, Transport,
    TransportError, TransportEvent, TransportRequest, TransportResult,
};
use async_trait::async_trait;

const DEFAULT_USER_AGENT: &str = concat!("hls-fetch/", env!("CARGO_PKG_VERSION"));

/// Privileged cross-origin transport backed by a shared HTTP client.
///
/// Request timeouts are deliberately not set on the client; liveness is
/// judged by the loader per byte-exchange interval.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Self::build_client())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn build_client() -> Client {
        Client::builder()
            .gzip(true)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("Failed to build HTTP client")
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, request: TransportRequest, state: ReadyStateCell, events: EventSender) {
        let method = Method::from_bytes(request.method.as_bytes()).unwrap_or(Method::GET);
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                state.set(ReadyState::Done);
                let _ = events.send(TransportEvent::Failed(TransportError::Network {
                    url: request.url.clone(),
                    reason: e.to_string(),
                }));
                return;
            }
        };

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("Unknown").to_string();
        let resolved_url = response.url().to_string();
        let total = response.content_length();

        state.set(ReadyState::HeadersReceived);
        let _ = events.send(TransportEvent::HeadersReceived {
            status: status.as_u16(),
            status_text: status_text.clone(),
            resolved_url: resolved_url.clone(),
            total,
        });

        state.set(ReadyState::Loading);
        let mut buf: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    buf.extend_from_slice(&chunk);
                    let _ = events.send(TransportEvent::Progress {
                        loaded: buf.len() as u64,
                        total,
                    });
                }
                Err(e) => {
                    state.set(ReadyState::Done);
                    let _ = events.send(TransportEvent::Failed(TransportError::Network {
                        url: request.url.clone(),
                        reason: e.to_string(),
                    }));
                    return;
                }
            }
        }

        debug!(url = %request.url, status = status.as_u16(), bytes = buf.len(), "Transfer finished");

        let body = match request.response_kind {
            ResponseKind::Binary => ResponseBody::Binary(buf.into()),
            ResponseKind::Text => ResponseBody::Text(String::from_utf8_lossy(&buf).into_owned()),
        };

        state.set(ReadyState::Done);
        let _ = events.send(TransportEvent::Done(TransportResult {
            status: status.as_u16(),
            status_text,
            resolved_url,
            body,
        }));
    }
}
