use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::LoadConfig;
use crate::loader::{LoadContext, LoadFailure, LoadResponse, LoaderCallbacks, LoaderState};
use crate::stats::LoadStats;
use crate::transport::{
    DefaultTransportProvider, TransportAdapter, TransportError, TransportEvent, TransportProvider,
    TransportResult,
};

/// Owns one fragment's fetch lifecycle: issuing the request, arming and
/// clearing the liveness timer, classifying completion, retrying with
/// exponential backoff, and reporting progress/success/error/timeout.
///
/// Exactly one attempt is ever in flight per instance. Events belonging to an
/// aborted attempt are never delivered: every handler consults the aborted
/// latch first.
#[derive(Clone)]
pub struct SegmentLoader {
    id: Uuid,
    provider: Arc<dyn TransportProvider>,
    shared: Arc<LoaderShared>,
}

struct LoaderShared {
    state: Mutex<LoaderState>,
    aborted: AtomicBool,
    complete: AtomicBool,
    in_flight: AtomicBool,
    /// Bumped by `abort()`/`destroy()`; clears both the request and retry
    /// timers on every exit path.
    abort_signal: watch::Sender<u32>,
    adapter: Mutex<Option<TransportAdapter>>,
}

enum AttemptOutcome {
    Done(TransportResult),
    Failed(TransportError),
    Aborted,
    /// Event channel ended without a terminal event.
    Closed,
}

impl SegmentLoader {
    pub fn new(provider: Arc<dyn TransportProvider>) -> Self {
        let (abort_signal, _) = watch::channel(0);
        Self {
            id: Uuid::new_v4(),
            provider,
            shared: Arc::new(LoaderShared {
                state: Mutex::new(LoaderState::Idle),
                aborted: AtomicBool::new(false),
                complete: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                abort_signal,
                adapter: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> LoaderState {
        *self.shared.state.lock().expect("loader state lock poisoned")
    }

    /// Runs the whole load to a terminal outcome, delivering every result
    /// through `callbacks`. Resolves once a terminal callback has fired or
    /// the load was aborted.
    pub async fn load(&self, context: LoadContext, config: LoadConfig, callbacks: LoaderCallbacks) {
        if !self.set_state(LoaderState::Loading) {
            warn!(loader_id = %self.id, state = %self.state(), url = %context.url, "load() refused: loader is not reusable in this state");
            return;
        }
        self.shared.aborted.store(false, Ordering::SeqCst);
        self.shared.complete.store(false, Ordering::SeqCst);
        let mut abort_rx = self.shared.abort_signal.subscribe();

        let mut stats = LoadStats::start();
        let mut retry_delay = config.retry_delay;

        loop {
            stats.begin_attempt();

            let mut adapter = match TransportAdapter::open("GET", &context.url, self.provider.as_ref()) {
                Ok(adapter) => adapter,
                Err(e) => {
                    error!(loader_id = %self.id, url = %context.url, error = %e, "Failed to open transport");
                    self.shared.complete.store(true, Ordering::SeqCst);
                    self.set_state(LoaderState::Error);
                    if !self.is_aborted() {
                        (callbacks.on_error)(
                            LoadFailure {
                                code: 0,
                                text: e.to_string(),
                            },
                            &context,
                        );
                    }
                    return;
                }
            };

            if let Some(setup) = &config.transport_setup {
                setup(&mut adapter, &context.url);
            }
            if let Some(range) = context.range_header() {
                adapter.set_request_header("Range", &range);
            }
            adapter.set_response_kind(context.response_kind);

            let mut events = adapter.send();
            *self.shared.adapter.lock().expect("adapter lock poisoned") = Some(adapter);
            self.shared.in_flight.store(true, Ordering::SeqCst);

            // Liveness timer: armed before the request goes out, cleared and
            // rearmed on every byte exchange.
            let timer = tokio::time::sleep(config.timeout);
            tokio::pin!(timer);
            let mut timer_armed = true;

            let outcome = loop {
                tokio::select! {
                    _ = abort_rx.changed() => break AttemptOutcome::Aborted,
                    _ = &mut timer, if timer_armed => {
                        timer_armed = false;
                        if !self.is_aborted() {
                            warn!(loader_id = %self.id, url = %context.url, "Segment fetch timed out");
                            self.set_state(LoaderState::TimedOut);
                            (callbacks.on_timeout)(&stats, &context);
                        }
                    }
                    event = events.recv() => match event {
                        None => break AttemptOutcome::Closed,
                        Some(_) if self.is_aborted() => break AttemptOutcome::Aborted,
                        Some(TransportEvent::HeadersReceived { total, .. }) => {
                            timer.as_mut().reset(tokio::time::Instant::now() + config.timeout);
                            timer_armed = true;
                            stats.mark_first_byte();
                            if let Some(total) = total {
                                stats.total = total;
                            }
                        }
                        Some(TransportEvent::Progress { loaded, total }) => {
                            timer.as_mut().reset(tokio::time::Instant::now() + config.timeout);
                            timer_armed = true;
                            stats.mark_first_byte();
                            stats.loaded = loaded;
                            if let Some(total) = total {
                                stats.total = total;
                            }
                            if let Some(on_progress) = &callbacks.on_progress {
                                on_progress(&stats, &context);
                            }
                        }
                        Some(TransportEvent::Done(result)) => break AttemptOutcome::Done(result),
                        Some(TransportEvent::Failed(e)) => break AttemptOutcome::Failed(e),
                    }
                }
            };

            self.shared.in_flight.store(false, Ordering::SeqCst);
            self.release_adapter();

            // A channel that ended without a terminal event and without an
            // abort is a dead transport; classify it as a network failure.
            let outcome = match outcome {
                AttemptOutcome::Closed if !self.is_aborted() => {
                    AttemptOutcome::Failed(TransportError::Network {
                        url: context.url.clone(),
                        reason: "transport ended without a result".to_string(),
                    })
                }
                other => other,
            };

            match outcome {
                AttemptOutcome::Aborted | AttemptOutcome::Closed => {
                    stats.aborted = self.is_aborted();
                    self.set_state(LoaderState::Idle);
                    return;
                }
                AttemptOutcome::Done(result) if (200..300).contains(&result.status) => {
                    stats.mark_loaded();
                    let len = result.body.len();
                    stats.loaded = len;
                    stats.total = len;
                    self.shared.complete.store(true, Ordering::SeqCst);
                    self.set_state(LoaderState::Success);
                    if !self.is_aborted() {
                        debug!(loader_id = %self.id, url = %context.url, loaded = len, retries = stats.retry_count, "Segment loaded");
                        (callbacks.on_success)(
                            LoadResponse {
                                url: result.resolved_url,
                                data: result.body,
                            },
                            &stats,
                            &context,
                        );
                    }
                    return;
                }
                AttemptOutcome::Done(result) => {
                    let failure = LoadFailure {
                        code: result.status,
                        text: result.status_text,
                    };
                    if !self.retry_allowed(&stats, &config, failure.code) {
                        self.surface_error(failure, &context, &callbacks);
                        return;
                    }
                    warn!(
                        loader_id = %self.id,
                        url = %context.url,
                        status = failure.code,
                        retry_in_ms = retry_delay.as_millis() as u64,
                        "Segment fetch returned error status, retrying"
                    );
                    if !self.wait_retry(retry_delay, &mut abort_rx).await {
                        self.set_state(LoaderState::Idle);
                        return;
                    }
                    retry_delay = config.next_retry_delay(retry_delay);
                    stats.retry_count += 1;
                    self.set_state(LoaderState::Loading);
                }
                AttemptOutcome::Failed(e) => {
                    // Network-level failure: no HTTP status, classified as
                    // code 0 and recoverable until retries run out.
                    let failure = LoadFailure {
                        code: 0,
                        text: e.to_string(),
                    };
                    if !self.retry_allowed(&stats, &config, failure.code) {
                        self.surface_error(failure, &context, &callbacks);
                        return;
                    }
                    warn!(
                        loader_id = %self.id,
                        url = %context.url,
                        error = %e,
                        retry_in_ms = retry_delay.as_millis() as u64,
                        "Segment fetch network error, retrying"
                    );
                    if !self.wait_retry(retry_delay, &mut abort_rx).await {
                        self.set_state(LoaderState::Idle);
                        return;
                    }
                    retry_delay = config.next_retry_delay(retry_delay);
                    stats.retry_count += 1;
                    self.set_state(LoaderState::Loading);
                }
            }
        }
    }

    /// Idempotent. When an attempt is in flight and not yet complete, sets
    /// the aborted latch and aborts the active transport; in every case both
    /// the request and retry timers are cleared.
    pub fn abort(&self) {
        if self.shared.in_flight.load(Ordering::SeqCst)
            && !self.shared.complete.load(Ordering::SeqCst)
        {
            self.shared.aborted.store(true, Ordering::SeqCst);
            if let Some(adapter) = self
                .shared
                .adapter
                .lock()
                .expect("adapter lock poisoned")
                .as_mut()
            {
                adapter.abort();
            }
        }
        self.shared.abort_signal.send_modify(|generation| *generation += 1);
    }

    /// `abort()` plus releasing the adapter reference. The loader cannot be
    /// reused afterwards.
    pub fn destroy(&self) {
        self.abort();
        self.release_adapter();
        self.set_state(LoaderState::Destroyed);
    }

    fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// Applies the transition if the state table allows it.
    fn set_state(&self, target: LoaderState) -> bool {
        let mut state = self.shared.state.lock().expect("loader state lock poisoned");
        if state.can_transition_to(target) {
            *state = target;
            true
        } else {
            false
        }
    }

    fn release_adapter(&self) {
        if let Some(mut adapter) = self
            .shared
            .adapter
            .lock()
            .expect("adapter lock poisoned")
            .take()
        {
            adapter.destroy();
        }
    }

    fn retry_allowed(&self, stats: &LoadStats, config: &LoadConfig, code: u16) -> bool {
        stats.retry_count < config.max_retry && !(400..499).contains(&code)
    }

    fn surface_error(&self, failure: LoadFailure, context: &LoadContext, callbacks: &LoaderCallbacks) {
        error!(loader_id = %self.id, url = %context.url, status = failure.code, "Segment fetch failed");
        self.shared.complete.store(true, Ordering::SeqCst);
        self.set_state(LoaderState::Error);
        if !self.is_aborted() {
            (callbacks.on_error)(failure, context);
        }
    }

    /// Sleeps out the retry delay. Returns `false` when the wait was cut
    /// short by an abort.
    async fn wait_retry(&self, delay: Duration, abort_rx: &mut watch::Receiver<u32>) -> bool {
        self.set_state(LoaderState::RetryScheduled);
        tokio::select! {
            _ = abort_rx.changed() => false,
            _ = tokio::time::sleep(delay) => !self.is_aborted(),
        }
    }
}

impl Default for SegmentLoader {
    fn default() -> Self {
        Self::new(Arc::new(DefaultTransportProvider::new()))
    }
}
