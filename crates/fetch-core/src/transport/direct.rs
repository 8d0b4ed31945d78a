use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;
use url::Url;

use super::{
    EventSender, ReadyState, ReadyStateCell, ResponseBody, ResponseKind, Transport,
    TransportError, TransportEvent, TransportRequest, TransportResult,
};

/// Direct transport for local, blob-style content (`file:` and `data:` URLs).
///
/// Request headers are best-effort on this variant: the platform has nothing
/// to apply them to, so they are silently ignored rather than failing the
/// request.
#[derive(Debug, Clone, Default)]
pub struct DirectTransport;

impl DirectTransport {
    pub fn new() -> Self {
        Self
    }

    async fn read(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| TransportError::InvalidUrl {
                    url: url.to_string(),
                    reason: "not a local file path".to_string(),
                })?;
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| TransportError::Local {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
            }
            "data" => decode_data_url(url),
            other => Err(TransportError::InvalidUrl {
                url: url.to_string(),
                reason: format!("scheme '{}' is not locally readable", other),
            }),
        }
    }
}

/// Decodes `data:[<mediatype>][;base64],<data>`. Non-base64 payloads are
/// taken verbatim.
fn decode_data_url(url: &Url) -> Result<Vec<u8>, TransportError> {
    let path = url.path();
    let (meta, payload) = path.split_once(',').ok_or_else(|| TransportError::InvalidUrl {
        url: url.to_string(),
        reason: "data URL has no payload separator".to_string(),
    })?;

    if meta.ends_with(";base64") {
        BASE64.decode(payload).map_err(|e| TransportError::Local {
            url: url.to_string(),
            reason: format!("base64 decode failed: {}", e),
        })
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn perform(&self, request: TransportRequest, state: ReadyStateCell, events: EventSender) {
        let url = match Url::parse(&request.url) {
            Ok(url) => url,
            Err(e) => {
                state.set(ReadyState::Done);
                let _ = events.send(TransportEvent::Failed(TransportError::InvalidUrl {
                    url: request.url.clone(),
                    reason: e.to_string(),
                }));
                return;
            }
        };

        let bytes = match self.read(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                state.set(ReadyState::Done);
                let _ = events.send(TransportEvent::Failed(e));
                return;
            }
        };

        debug!(url = %request.url, bytes = bytes.len(), "Local read finished");

        let total = Some(bytes.len() as u64);
        state.set(ReadyState::HeadersReceived);
        let _ = events.send(TransportEvent::HeadersReceived {
            status: 200,
            status_text: "OK".to_string(),
            resolved_url: request.url.clone(),
            total,
        });

        state.set(ReadyState::Loading);
        let _ = events.send(TransportEvent::Progress {
            loaded: bytes.len() as u64,
            total,
        });

        let body = match request.response_kind {
            ResponseKind::Binary => ResponseBody::Binary(bytes.into()),
            ResponseKind::Text => ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned()),
        };

        state.set(ReadyState::Done);
        let _ = events.send(TransportEvent::Done(TransportResult {
            status: 200,
            status_text: "OK".to_string(),
            resolved_url: request.url.clone(),
            body,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;
    use uuid::Uuid;

    fn request(url: &str, kind: ResponseKind) -> TransportRequest {
        TransportRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            // Headers are ignored on this variant; include one to prove it.
            headers: vec![("Range".to_string(), "bytes=0-1".to_string())],
            response_kind: kind,
        }
    }

    async fn collect(req: TransportRequest) -> (ReadyStateCell, Vec<TransportEvent>) {
        let state = ReadyStateCell::new();
        let (tx, mut rx) = unbounded_channel();
        DirectTransport::new().perform(req, state.clone(), tx).await;
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        (state, events)
    }

    #[tokio::test]
    async fn serves_file_url() {
        let path = std::env::temp_dir().join(format!("fetch-core-{}.bin", Uuid::new_v4()));
        std::fs::write(&path, [42u8; 32]).unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let (state, events) = collect(request(url.as_str(), ResponseKind::Binary)).await;
        std::fs::remove_file(&path).ok();

        assert_eq!(state.get(), ReadyState::Done);
        match events.last() {
            Some(TransportEvent::Done(result)) => {
                assert_eq!(result.status, 200);
                assert_eq!(result.body.len(), 32);
                assert_eq!(result.resolved_url, url.as_str());
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_file_fails_without_status() {
        let (_, events) =
            collect(request("file:///nonexistent/fetch-core-test.bin", ResponseKind::Binary)).await;
        assert!(matches!(
            events.last(),
            Some(TransportEvent::Failed(TransportError::Local { .. }))
        ));
    }

    #[tokio::test]
    async fn decodes_base64_data_url() {
        // "init" in base64.
        let (_, events) =
            collect(request("data:application/octet-stream;base64,aW5pdA==", ResponseKind::Binary))
                .await;
        match events.last() {
            Some(TransportEvent::Done(result)) => {
                assert_eq!(result.body.as_bytes(), b"init");
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn plain_data_url_passes_payload_through() {
        let (_, events) = collect(request("data:text/plain,WEBVTT", ResponseKind::Text)).await;
        match events.last() {
            Some(TransportEvent::Done(result)) => match &result.body {
                ResponseBody::Text(text) => assert_eq!(text, "WEBVTT"),
                other => panic!("expected text body, got {:?}", other),
            },
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_data_url_fails() {
        let (_, events) = collect(request("data:application/octet-stream;base64", ResponseKind::Binary)).await;
        assert!(matches!(
            events.last(),
            Some(TransportEvent::Failed(TransportError::InvalidUrl { .. }))
        ));
    }

    #[tokio::test]
    async fn progress_reports_full_length() {
        let (_, events) = collect(request("data:text/plain,abcdef", ResponseKind::Binary)).await;
        assert!(events.iter().any(|e| matches!(
            e,
            TransportEvent::Progress {
                loaded: 6,
                total: Some(6)
            }
        )));
    }
}
