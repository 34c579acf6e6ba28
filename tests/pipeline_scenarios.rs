use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::{Value, json};
use tokio::time::Instant;

use penguin_api_client::auth::{CredentialStore, MemoryCredentialStore, Navigator};
use penguin_api_client::classify::messages;
use penguin_api_client::telemetry::{RecordingSink, events};
use penguin_api_client::transport::{
    PreparedRequest, Transport, TransportError, TransportResponse,
};
use penguin_api_client::{
    ApiClient, ApiClientBuilder, ErrorKind, IDEMPOTENCY_KEY_HEADER, REQUEST_ID_HEADER,
    RequestConfig,
};

type Reply = Result<TransportResponse, TransportError>;

#[derive(Default)]
struct Script {
    replies: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<PreparedRequest>>,
    delay: Mutex<Option<Duration>>,
}

/// Transport answering from a queue; an empty queue answers `200 {"ok": true}`.
#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::default();
        transport.script.replies.lock().unwrap().extend(replies);
        transport
    }

    fn sent(&self) -> Vec<PreparedRequest> {
        self.script.sent.lock().unwrap().clone()
    }

    fn sent_count(&self) -> usize {
        self.script.sent.lock().unwrap().len()
    }

    fn set_delay(&self, delay: Duration) {
        *self.script.delay.lock().unwrap() = Some(delay);
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError> {
        self.script.sent.lock().unwrap().push(request);
        let delay = *self.script.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.script.replies.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| Ok(TransportResponse::json(StatusCode::OK, &json!({"ok": true}))))
    }
}

fn ok(body: Value) -> Reply {
    Ok(TransportResponse::json(StatusCode::OK, &body))
}

fn status(code: u16) -> Reply {
    Ok(TransportResponse::new(
        StatusCode::from_u16(code).unwrap(),
        r#"{"detail":"internal details"}"#,
    ))
}

fn no_response() -> Reply {
    Err(TransportError::NoResponse("connection reset".into()))
}

#[derive(Default)]
struct CountingNavigator(AtomicUsize);

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    client: ApiClient<ScriptedTransport>,
    transport: ScriptedTransport,
    sink: Arc<RecordingSink>,
    credentials: Arc<MemoryCredentialStore>,
    navigator: Arc<CountingNavigator>,
}

fn harness_with(builder: ApiClientBuilder, replies: impl IntoIterator<Item = Reply>) -> Harness {
    let transport = ScriptedTransport::new(replies);
    let sink = Arc::new(RecordingSink::new());
    let credentials = Arc::new(MemoryCredentialStore::with_token("tok-123"));
    let navigator = Arc::new(CountingNavigator::default());
    let client = builder
        .base_url("http://penguin.test/api/v1")
        .telemetry(sink.clone())
        .credentials(credentials.clone())
        .navigator(navigator.clone())
        .build_with_transport(transport.clone())
        .unwrap();
    Harness {
        client,
        transport,
        sink,
        credentials,
        navigator,
    }
}

fn harness(replies: impl IntoIterator<Item = Reply>) -> Harness {
    harness_with(ApiClient::builder(), replies)
}

fn delays(sink: &RecordingSink) -> Vec<u64> {
    sink.events_named(events::API_RETRY)
        .iter()
        .map(|event| event.properties["delay_ms"].as_u64().unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_network_failures_then_success() {
    let h = harness([no_response(), no_response(), ok(json!({"balance": 10}))]);
    let started = Instant::now();

    let body: Value = h.client.get("/summary").await.unwrap();

    assert_eq!(body, json!({"balance": 10}));
    assert_eq!(h.transport.sent_count(), 3);
    assert_eq!(h.sink.count(events::API_RETRY), 2);
    assert_eq!(delays(&h.sink), vec![1_000, 2_000]);
    assert_eq!(h.sink.count(events::API_NETWORK_ERROR), 2);
    assert_eq!(h.sink.count(events::API_RESPONSE_SUCCESS), 1);
    assert_eq!(h.sink.count(events::API_RESPONSE_ERROR), 0);
    assert!(started.elapsed() >= Duration::from_millis(3_000));

    // Every retry re-sends the same attempt.
    let ids: Vec<_> = h
        .transport
        .sent()
        .iter()
        .map(|request| request.headers[REQUEST_ID_HEADER].clone())
        .collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_rejects_without_dispatch() {
    let h = harness([]);

    for _ in 0..100 {
        let _: Value = h.client.get("/transactions").await.unwrap();
        assert!(!h.client.rate_limit_status().await.blocked);
    }

    let err = h.client.get::<Value>("/transactions").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.http_status(), None);
    assert!(err.retry_after().is_some());
    assert_eq!(h.transport.sent_count(), 100);
    assert_eq!(h.sink.count(events::API_RATE_LIMIT_EXCEEDED), 1);

    let status = h.client.rate_limit_status().await;
    assert!(status.blocked);
    assert_eq!(status.requests_in_window, 100);
    assert_eq!(status.max_requests, 100);
}

#[tokio::test(start_paused = true)]
async fn test_absurd_rate_limit_headers_are_survivable() {
    let mut too_many = TransportResponse::new(StatusCode::TOO_MANY_REQUESTS, "");
    too_many.headers.insert(
        "retry-after",
        HeaderValue::from_static("18446744073709551615"),
    );
    let mut exhausted = TransportResponse::json(StatusCode::OK, &json!({}));
    exhausted
        .headers
        .insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
    exhausted.headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from_static("-9223372036854775808"),
    );
    let h = harness([Ok(exhausted), Ok(too_many)]);

    let client = h.client.clone();
    let first = tokio::spawn(async move { client.get::<Value>("/summary").await })
        .await
        .unwrap();
    assert!(first.is_ok());

    let client = h.client.clone();
    let err = tokio::spawn(async move { client.get::<Value>("/summary").await })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.http_status(), Some(429));

    let reset_in = h.client.rate_limit_status().await.reset_in().unwrap();
    assert!(reset_in <= Duration::from_secs(86_400));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_clears_credentials_once() {
    let h = harness([status(401)]);

    let err = h.client.get::<Value>("/auth/me").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.user_message(), messages::AUTH);
    assert_eq!(err.http_status(), Some(401));
    assert!(!h.credentials.has_token());
    assert_eq!(h.navigator.0.load(Ordering::SeqCst), 1);
    assert_eq!(h.transport.sent_count(), 1);
    assert_eq!(h.sink.count(events::API_RETRY), 0);
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_exhaust_retries() {
    let h = harness([status(503), status(502), status(500), status(503)]);

    let err = h.client.get::<Value>("/budgets").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.http_status(), Some(503));
    assert!(!err.user_message().contains("internal details"));
    assert_eq!(h.transport.sent_count(), 4);
    assert_eq!(delays(&h.sink), vec![1_000, 2_000, 4_000]);
    assert_eq!(h.sink.count(events::API_RESPONSE_ERROR), 1);

    let error_event = &h.sink.events_named(events::API_RESPONSE_ERROR)[0];
    assert_eq!(error_event.properties["kind"], "ServerError");
    assert_eq!(error_event.properties["retry_count"], 3);
    assert_eq!(error_event.properties["request_id"], err.request_id().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_post_is_not_retried_without_idempotency_key() {
    let h = harness([status(503)]);

    let err = h
        .client
        .post::<Value, _>("/transactions", &json!({"amount": 12}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(h.transport.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_post_with_idempotency_key_is_retried() {
    let h = harness([status(503), ok(json!({"id": 7}))]);
    let options = RequestConfig::new().idempotency_key("txn-42");

    let created: Value = h
        .client
        .post_with("/transactions", &json!({"amount": 12}), &options)
        .await
        .unwrap();

    assert_eq!(created["id"], 7);
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].headers[IDEMPOTENCY_KEY_HEADER], "txn-42");
    assert_eq!(sent[0].body, sent[1].body);
}

#[tokio::test(start_paused = true)]
async fn test_client_errors_are_not_retried() {
    for (code, kind) in [
        (400, ErrorKind::Validation),
        (403, ErrorKind::Forbidden),
        (404, ErrorKind::NotFound),
        (422, ErrorKind::Validation),
        (418, ErrorKind::Unknown),
    ] {
        let h = harness([status(code)]);
        let err = h.client.get::<Value>("/courses/1").await.unwrap_err();
        assert_eq!(err.kind(), kind, "status {code}");
        assert_eq!(h.transport.sent_count(), 1);
        assert!(h.credentials.has_token());
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_classify_as_network() {
    let replies = (0..4).map(|_| Err(TransportError::Timeout));
    let h = harness(replies);

    let err = h.client.get::<Value>("/investments").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.is_network_error());
    assert_eq!(err.user_message(), messages::TIMEOUT);
    assert_eq!(h.transport.sent_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_window_slides_for_client() {
    let h = harness_with(
        ApiClient::builder().rate_limit(Duration::from_secs(1), 2),
        [],
    );

    let _: Value = h.client.get("/watchlists").await.unwrap();
    let _: Value = h.client.get("/watchlists").await.unwrap();
    assert!(h.client.get::<Value>("/watchlists").await.is_err());

    tokio::time::advance(Duration::from_secs(1)).await;
    let _: Value = h.client.get("/watchlists").await.unwrap();
    assert_eq!(h.transport.sent_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_server_signal_blocks_until_reset() {
    let reset = time::OffsetDateTime::now_utc().unix_timestamp() + 30;
    let mut exhausted = TransportResponse::json(StatusCode::OK, &json!([]));
    exhausted
        .headers
        .insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
    exhausted.headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from_str(&reset.to_string()).unwrap(),
    );
    let h = harness([Ok(exhausted)]);

    let _: Value = h.client.get("/lessons").await.unwrap();
    let err = h.client.get::<Value>("/lessons").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(h.transport.sent_count(), 1);

    h.client.reset_rate_limit().await;
    let _: Value = h.client.get("/lessons").await.unwrap();
    assert_eq!(h.transport.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_headers_and_wire_body_are_not_scrubbed() {
    let h = harness([]);
    let login = json!({"username": "penguin", "password": "hunter2"});

    let _: Value = h.client.post("/auth/login", &login).await.unwrap();

    let sent = &h.transport.sent()[0];
    assert_eq!(sent.headers[AUTHORIZATION], "Bearer tok-123");
    assert!(sent.headers[AUTHORIZATION].is_sensitive());
    assert_eq!(sent.headers["content-type"], "application/json");
    assert_eq!(sent.headers["accept"], "application/json");
    assert_eq!(sent.timeout, Duration::from_secs(30));
    let wire: Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
    assert_eq!(wire, login);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_is_scrubbed() {
    let h = harness([]);

    let _: Value = h
        .client
        .get("/auth/me?access_token=leaky-token&email=jane@example.com")
        .await
        .unwrap();

    for event in h.sink.events() {
        let rendered = serde_json::to_string(&event.properties).unwrap();
        assert!(!rendered.contains("leaky-token"), "{rendered}");
        assert!(!rendered.contains("jane@example.com"), "{rendered}");
        assert!(!rendered.contains("tok-123"), "{rendered}");
    }
    // The request itself still carries the real query string.
    assert!(h.transport.sent()[0].url.as_str().contains("leaky-token"));
}

#[tokio::test(start_paused = true)]
async fn test_without_auth_skips_bearer() {
    let h = harness([]);

    let _: Value = h
        .client
        .get_with("/auth/register", &RequestConfig::new().without_auth())
        .await
        .unwrap();

    assert!(!h.transport.sent()[0].headers.contains_key(AUTHORIZATION));
    assert!(h.credentials.auth_token().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_empty_and_invalid_bodies() {
    let h = harness([
        Ok(TransportResponse::new(StatusCode::NO_CONTENT, "")),
        Ok(TransportResponse::new(StatusCode::OK, "<html>oops</html>")),
    ]);

    h.client.delete::<()>("/budgets/3").await.unwrap();

    let err = h.client.get::<Value>("/summary").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert_eq!(err.http_status(), Some(200));
    assert!(!err.user_message().contains("oops"));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_call_is_harmless() {
    let h = harness([]);
    h.transport.set_delay(Duration::from_secs(5));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), h.client.get::<Value>("/summary")).await;
    assert!(abandoned.is_err());

    // The limiter recorded the abandoned dispatch and keeps working.
    let status = h.client.rate_limit_status().await;
    assert_eq!(status.requests_in_window, 1);
    let _: Value = h.client.get("/summary").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_url_is_unknown_error() {
    let h = harness([]);

    let err = h.client.get::<Value>("http://[::1").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unknown);
    assert_eq!(h.transport.sent_count(), 0);
    assert_eq!(h.sink.count(events::API_RESPONSE_ERROR), 1);
}
