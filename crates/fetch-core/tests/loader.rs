use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fetch_core::{
    LoadConfig, LoadContext, LoadFailure, LoadResponse, LoadStats, LoaderCallbacks, ResponseKind,
    SegmentLoader,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recorded {
    successes: Mutex<Vec<(String, Vec<u8>, u64, u32)>>,
    errors: Mutex<Vec<LoadFailure>>,
    timeouts: Mutex<u32>,
    progress: Mutex<Vec<u64>>,
}

fn callbacks(rec: Arc<Recorded>) -> LoaderCallbacks {
    let on_success = {
        let rec = Arc::clone(&rec);
        Box::new(
            move |response: LoadResponse, stats: &LoadStats, _: &LoadContext| {
                rec.successes.lock().unwrap().push((
                    response.url,
                    response.data.as_bytes().to_vec(),
                    stats.loaded,
                    stats.retry_count,
                ));
            },
        )
    };
    let on_error = {
        let rec = Arc::clone(&rec);
        Box::new(move |failure: LoadFailure, _: &LoadContext| {
            rec.errors.lock().unwrap().push(failure);
        })
    };
    let on_timeout = {
        let rec = Arc::clone(&rec);
        Box::new(move |_: &LoadStats, _: &LoadContext| {
            *rec.timeouts.lock().unwrap() += 1;
        })
    };
    let on_progress = {
        let rec = Arc::clone(&rec);
        Box::new(move |stats: &LoadStats, _: &LoadContext| {
            rec.progress.lock().unwrap().push(stats.loaded);
        })
    };
    LoaderCallbacks {
        on_success,
        on_error,
        on_timeout,
        on_progress: Some(on_progress),
    }
}

fn fast_config() -> LoadConfig {
    LoadConfig::default()
        .with_timeout(5_000)
        .with_retry_delay(10)
        .with_max_retry_delay(40)
}

#[tokio::test]
async fn loads_segment_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/seg_1.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 188]))
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    loader
        .load(
            LoadContext::new(format!("{}/seg_1.ts", server.uri())),
            fast_config(),
            callbacks(Arc::clone(&rec)),
        )
        .await;

    let successes = rec.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    let (url, data, loaded, retries) = &successes[0];
    assert!(url.ends_with("/seg_1.ts"));
    assert_eq!(data.len(), 188);
    assert_eq!(*loaded, 188);
    assert_eq!(*retries, 0);
    assert!(rec.errors.lock().unwrap().is_empty());
    assert!(!rec.progress.lock().unwrap().is_empty());
}

#[tokio::test]
async fn sends_the_range_header_for_partial_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/seg_1.ts"))
        .and(header("Range", "bytes=100-199"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![1u8; 100]))
        .expect(1)
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    loader
        .load(
            LoadContext::new(format!("{}/seg_1.ts", server.uri())).with_range(100, 200),
            fast_config(),
            callbacks(Arc::clone(&rec)),
        )
        .await;

    assert_eq!(rec.successes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn retries_server_errors_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.ts"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"seg".to_vec()))
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    let begun = Instant::now();
    loader
        .load(
            LoadContext::new(format!("{}/flaky.ts", server.uri())),
            fast_config(),
            callbacks(Arc::clone(&rec)),
        )
        .await;

    let successes = rec.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].3, 2);
    // Two backoff waits happened: retry_delay, then min(2 * retry_delay, cap).
    assert!(begun.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down.ts"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    loader
        .load(
            LoadContext::new(format!("{}/down.ts", server.uri())),
            fast_config().with_max_retry(2),
            callbacks(Arc::clone(&rec)),
        )
        .await;

    let errors = rec.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, 503);
    assert!(rec.successes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.ts"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    loader
        .load(
            LoadContext::new(format!("{}/gone.ts", server.uri())),
            fast_config(),
            callbacks(Arc::clone(&rec)),
        )
        .await;

    let errors = rec.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, 404);
    assert_eq!(errors[0].text, "Not Found");
}

#[tokio::test]
async fn timeout_is_reported_while_the_transfer_continues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.ts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    loader
        .load(
            LoadContext::new(format!("{}/slow.ts", server.uri())),
            fast_config().with_timeout(50),
            callbacks(Arc::clone(&rec)),
        )
        .await;

    // The timeout fired, the transfer was left running, and the late
    // response still landed.
    assert_eq!(*rec.timeouts.lock().unwrap(), 1);
    assert_eq!(rec.successes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn abort_suppresses_a_late_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.ts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    let task = {
        let loader = loader.clone();
        let rec = Arc::clone(&rec);
        let url = format!("{}/slow.ts", server.uri());
        tokio::spawn(async move {
            loader
                .load(LoadContext::new(url), fast_config(), callbacks(rec))
                .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    loader.abort();
    task.await.unwrap();

    assert!(rec.successes.lock().unwrap().is_empty());
    assert!(rec.errors.lock().unwrap().is_empty());
    assert_eq!(*rec.timeouts.lock().unwrap(), 0);
}

#[tokio::test]
async fn transport_setup_hook_runs_before_each_send() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tokened.ts"))
        .and(header("X-Session-Token", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    let config = fast_config().with_transport_setup(Arc::new(|adapter, _url| {
        adapter.set_request_header("X-Session-Token", "abc123");
    }));
    loader
        .load(
            LoadContext::new(format!("{}/tokened.ts", server.uri())),
            config,
            callbacks(Arc::clone(&rec)),
        )
        .await;

    assert_eq!(rec.successes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn loads_text_from_a_data_url() {
    let loader = SegmentLoader::default();
    let rec = Arc::new(Recorded::default());
    loader
        .load(
            LoadContext::new("data:text/vtt,WEBVTT").with_response_kind(ResponseKind::Text),
            fast_config(),
            callbacks(Arc::clone(&rec)),
        )
        .await;

    let successes = rec.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].1, b"WEBVTT");
    assert_eq!(successes[0].2, 6);
}
