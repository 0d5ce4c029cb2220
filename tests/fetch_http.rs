// tests/fetch_http.rs
mod support;

use std::sync::Arc;
use std::time::Duration;

use feed_harvester::ingest::fetch::{
    FeedFetcher, FetchConfig, FetchError, HttpFetcher, FEED_ACCEPT,
};
use support::RecordingPause;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &str = "<rss version=\"2.0\"><channel><title>t</title></channel></rss>";

fn config() -> FetchConfig {
    FetchConfig {
        timeout: Duration::from_secs(5),
        max_retries: 4,
        backoff_factor: 0.6,
        polite_delay: Duration::from_millis(400),
        user_agent: "TestBot/1.0".to_string(),
    }
}

fn fetcher(cfg: &FetchConfig) -> (HttpFetcher, Arc<RecordingPause>) {
    let pause = Arc::new(RecordingPause::default());
    let f = HttpFetcher::new(cfg).unwrap().with_pause(pause.clone());
    (f, pause)
}

#[tokio::test]
async fn sends_identification_and_feed_accept_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .and(header("user-agent", "TestBot/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .expect(1)
        .mount(&server)
        .await;

    let (f, pause) = fetcher(&config());
    let body = f.fetch(&format!("{}/rss", server.uri())).await.unwrap();
    assert_eq!(body, BODY.as_bytes());
    assert!(pause.delays().is_empty());

    let reqs = server.received_requests().await.unwrap();
    let accept = reqs[0].headers.get("accept").unwrap().to_str().unwrap();
    assert_eq!(accept, FEED_ACCEPT);
}

#[tokio::test]
async fn transient_statuses_are_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .expect(1)
        .mount(&server)
        .await;

    let (f, pause) = fetcher(&config());
    let body = f.fetch(&format!("{}/flaky", server.uri())).await.unwrap();
    assert_eq!(body, BODY.as_bytes());
    assert_eq!(
        pause.delays(),
        vec![Duration::ZERO, Duration::from_millis(1200)]
    );
}

#[tokio::test]
async fn retries_are_bounded_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&server)
        .await;

    let (f, pause) = fetcher(&config());
    let err = f.fetch(&format!("{}/down", server.uri())).await.unwrap_err();
    match err {
        FetchError::Exhausted { attempts, last, .. } => {
            assert_eq!(attempts, 5);
            assert!(matches!(*last, FetchError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        pause.delays(),
        vec![
            Duration::ZERO,
            Duration::from_millis(1200),
            Duration::from_millis(2400),
            Duration::from_millis(4800),
        ]
    );
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (f, pause) = fetcher(&config());
    let err = f.fetch(&format!("{}/gone", server.uri())).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(pause.delays().is_empty());
}

#[tokio::test]
async fn retry_after_overrides_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .mount(&server)
        .await;

    let (f, pause) = fetcher(&config());
    f.fetch(&format!("{}/busy", server.uri())).await.unwrap();
    assert_eq!(pause.delays(), vec![Duration::from_secs(3)]);
}

#[tokio::test]
async fn polite_delay_between_successive_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .expect(3)
        .mount(&server)
        .await;

    let (f, pause) = fetcher(&config());
    for p in ["/a", "/b", "/c"] {
        f.fetch(&format!("{}{p}", server.uri())).await.unwrap();
    }
    assert_eq!(
        pause.delays(),
        vec![Duration::from_millis(400), Duration::from_millis(400)]
    );
}

#[tokio::test]
async fn connection_failures_are_transient() {
    // Reserve a port, then free it so nothing is listening.
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let cfg = FetchConfig {
        max_retries: 1,
        ..config()
    };
    let (f, pause) = fetcher(&cfg);
    let err = f
        .fetch(&format!("http://127.0.0.1:{port}/rss"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::Exhausted { attempts: 2, .. }),
        "{err}"
    );
    assert_eq!(pause.delays(), vec![Duration::ZERO]);
}

#[tokio::test]
async fn slow_servers_hit_the_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(BODY)
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let cfg = FetchConfig {
        timeout: Duration::from_millis(200),
        max_retries: 0,
        ..config()
    };
    let (f, _pause) = fetcher(&cfg);
    let err = f.fetch(&format!("{}/slow", server.uri())).await.unwrap_err();
    match err {
        FetchError::Exhausted { attempts, last, .. } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, FetchError::Request { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn invalid_urls_fail_before_any_request() {
    let (f, pause) = fetcher(&config());
    assert!(matches!(
        f.fetch("not a url").await,
        Err(FetchError::InvalidUrl { .. })
    ));
    assert!(matches!(
        f.fetch("/relative/feed.xml").await,
        Err(FetchError::InvalidUrl { .. })
    ));
    assert!(pause.delays().is_empty());
}
