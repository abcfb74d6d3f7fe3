use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, ConnectInfo, Request},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use futures::stream;
use http_body_util::BodyExt;
use loghttp::{AccessLogLayer, AccessLogger, AccessRecord, HIJACKED};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::sleep,
};
use tower::{service_fn, Layer, ServiceBuilder, ServiceExt};

/// Test logger that collects every record for verification
#[derive(Debug, Clone, Default)]
struct TestLogger {
    records: Arc<Mutex<Vec<AccessRecord>>>,
}

impl TestLogger {
    fn new() -> Self {
        Self::default()
    }

    fn get_records(&self) -> Vec<AccessRecord> {
        self.records.lock().unwrap().clone()
    }

    fn wait_for_records(&self, expected_count: usize, timeout: Duration) -> bool {
        let start = SystemTime::now();
        while start.elapsed().unwrap() < timeout {
            if self.records.lock().unwrap().len() >= expected_count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn single_record(&self) -> AccessRecord {
        assert!(self.wait_for_records(1, Duration::from_secs(1)));
        let records = self.get_records();
        assert_eq!(records.len(), 1, "expected exactly one record");
        records[0].clone()
    }
}

impl AccessLogger for TestLogger {
    fn log(&self, record: &AccessRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

// Test server handlers
async fn hello_handler() -> impl IntoResponse {
    "hello"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn missing_handler() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn delayed_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await;
    "Delayed response"
}

async fn chunked_handler() -> impl IntoResponse {
    let stream = stream::iter(vec![
        Ok::<_, Infallible>(Bytes::from("a".repeat(10))),
        Ok(Bytes::new()),
        Ok(Bytes::from("b".repeat(20))),
    ]);

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn switching_handler() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header("upgrade", "websocket")
        .header("connection", "upgrade")
        .body(Body::empty())
        .unwrap()
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(|mut socket| async move {
        let _ = socket.send("upgraded".into()).await;
    })
}

async fn panic_handler() -> &'static str {
    panic!("handler exploded");
}

fn create_test_app(logger: TestLogger) -> Router {
    Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/missing", get(missing_handler))
        .route("/delayed", get(delayed_handler))
        .route("/chunks", get(chunked_handler))
        .route("/switch", get(switching_handler))
        .route("/ws", get(ws_handler))
        .route("/panic", get(panic_handler))
        .layer(
            ServiceBuilder::new()
                .layer(AccessLogLayer::new(logger))
                .into_inner(),
        )
}

fn request(method: Method, uri: &str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_basic_request_response() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/hello").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "hello");

    let record = logger.single_record();
    assert_eq!(record.method, Method::GET);
    assert_eq!(record.uri.path(), "/hello");
    assert_eq!(record.status, 200);
    assert_eq!(record.length, 5);
    assert!(!record.hijacked);
    assert_eq!(record.method_label(), "GET");
}

#[tokio::test]
async fn test_status_without_body() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/missing").expect_failure().await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    let record = logger.single_record();
    assert_eq!(record.status, 404);
    assert_eq!(record.length, 0);
}

#[tokio::test]
async fn test_chunked_response_counted() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/chunks").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), format!("{}{}", "a".repeat(10), "b".repeat(20)));

    let record = logger.single_record();
    assert_eq!(record.status, 200);
    assert_eq!(record.length, 30);
}

#[tokio::test]
async fn test_middleware_passthrough() {
    // Verify middleware doesn't interfere with normal operation
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());
    let server = axum_test::TestServer::new(app).unwrap();

    let hello_response = server.get("/hello").await;
    assert_eq!(hello_response.text(), "hello");

    let echo_response = server.post("/echo").text("test").await;
    assert_eq!(echo_response.status_code(), StatusCode::OK);
    assert_eq!(echo_response.text(), "Echo: test");
    assert_eq!(
        echo_response.header("content-type"),
        "text/plain; charset=utf-8"
    );

    assert!(logger.wait_for_records(2, Duration::from_secs(1)));
    let records = logger.get_records();
    assert_eq!(records.len(), 2);

    let echo = records.iter().find(|r| r.uri.path() == "/echo").unwrap();
    assert_eq!(echo.method, Method::POST);
    assert_eq!(echo.length, "Echo: test".len() as u64);
}

#[tokio::test]
async fn test_timing_recorded() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());
    let server = axum_test::TestServer::new(app).unwrap();

    let start_time = SystemTime::now();
    let response = server.get("/delayed").await;
    let actual_duration = start_time.elapsed().unwrap();
    assert_eq!(response.text(), "Delayed response");

    let record = logger.single_record();
    assert!(record.duration >= Duration::from_millis(90)); // Allow some tolerance
    assert!(record.duration <= actual_duration + Duration::from_millis(50));
}

#[tokio::test]
async fn test_multiple_concurrent_requests() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());
    let server = Arc::new(axum_test::TestServer::new(app).unwrap());

    use futures::future::join_all;

    let futures: Vec<_> = (0..5)
        .map(|i| {
            let server = server.clone();
            async move { server.post("/echo").text(format!("Request {i}")).await }
        })
        .collect();

    let responses = join_all(futures).await;
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.text(), format!("Echo: Request {i}"));
    }

    assert!(logger.wait_for_records(5, Duration::from_secs(2)));
    let records = logger.get_records();
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.status, 200);
        assert_eq!(record.length, "Echo: Request 0".len() as u64);
    }
}

#[tokio::test]
async fn test_switching_protocols_logged_as_hijacked() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());

    let response = app.oneshot(request(Method::GET, "/switch")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());

    let record = logger.single_record();
    assert!(record.hijacked);
    assert_eq!(record.status, 101);
    assert_eq!(record.length, 0);
    assert_eq!(record.method_label(), HIJACKED);
    assert!(record.to_string().contains(" HIJACKED "));
}

#[tokio::test]
async fn test_connect_info_used_as_remote_addr() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());

    let addr: SocketAddr = "203.0.113.9:40000".parse().unwrap();
    let mut req = request(Method::GET, "/hello?name=x");
    req.extensions_mut().insert(ConnectInfo(addr));

    let response = app.oneshot(req).await.unwrap();
    response.into_body().collect().await.unwrap();

    let record = logger.single_record();
    assert_eq!(record.remote_addr, "203.0.113.9:40000");
    assert_eq!(record.uri, "/hello?name=x");
    let line = record.to_string();
    assert!(line.starts_with("203.0.113.9:40000 - 200      5b GET  "));
    assert!(line.ends_with(" /hello?name=x"));
}

#[tokio::test]
async fn test_unconsumed_body_logged_on_drop() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());

    let response = app.oneshot(request(Method::GET, "/chunks")).await.unwrap();
    assert!(logger.get_records().is_empty());

    drop(response);

    let record = logger.single_record();
    assert_eq!(record.status, 200);
    assert_eq!(record.length, 0);
}

#[tokio::test]
async fn test_inner_error_logged_with_zero_status() {
    let logger = TestLogger::new();
    let failing = service_fn(|_req: Request| async {
        Err::<Response, _>(std::io::Error::other("backend unavailable"))
    });
    let service = AccessLogLayer::new(logger.clone()).layer(failing);

    let err = service
        .oneshot(request(Method::PUT, "/fail"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "backend unavailable");

    let record = logger.single_record();
    assert_eq!(record.status, 0);
    assert_eq!(record.length, 0);
    assert_eq!(record.method, Method::PUT);
}

#[tokio::test]
async fn test_cancelled_request_logged_once() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());

    // The handler sleeps for 100ms; give up long before that
    let result = tokio::time::timeout(
        Duration::from_millis(20),
        app.oneshot(request(Method::GET, "/delayed")),
    )
    .await;
    assert!(result.is_err());

    let record = logger.single_record();
    assert_eq!(record.status, 0);
    assert_eq!(record.length, 0);
    assert_eq!(record.uri.path(), "/delayed");
}

#[tokio::test]
async fn test_panicking_handler_logged_once() {
    let logger = TestLogger::new();
    let app = create_test_app(logger.clone());

    let result = tokio::spawn(app.oneshot(request(Method::GET, "/panic"))).await;
    assert!(result.unwrap_err().is_panic());

    let record = logger.single_record();
    assert_eq!(record.status, 0);
}

async fn serve_on_loopback(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

async fn read_response_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await.unwrap() == 0 {
            break;
        }
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_real_server_logs_client_address() {
    let logger = TestLogger::new();
    let addr = serve_on_loopback(create_test_app(logger.clone())).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200 OK"));
    assert!(raw.ends_with("hello"));

    let record = logger.single_record();
    assert_eq!(record.remote_addr, stream.local_addr().unwrap().to_string());
    assert_eq!(record.length, 5);
}

async fn fetch_hello_head(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    assert_eq!(body, "hello");
    head.lines()
        .filter(|line| !line.to_ascii_lowercase().starts_with("date:"))
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_real_server_framing_unchanged_by_layer() {
    let plain = serve_on_loopback(Router::new().route("/hello", get(hello_handler))).await;
    let logger = TestLogger::new();
    let logged = serve_on_loopback(create_test_app(logger.clone())).await;

    let plain_head = fetch_hello_head(plain).await;
    let logged_head = fetch_hello_head(logged).await;

    assert_eq!(plain_head, logged_head);
    let lower = logged_head.to_ascii_lowercase();
    assert!(lower.contains("content-length: 5"), "unexpected head: {logged_head}");
    assert!(!lower.contains("transfer-encoding"), "unexpected head: {logged_head}");
    assert_eq!(logger.single_record().length, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_real_websocket_upgrade_logged_as_hijacked() {
    let logger = TestLogger::new();
    let addr = serve_on_loopback(create_test_app(logger.clone())).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"GET /ws HTTP/1.1\r\n\
              Host: localhost\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Version: 13\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

    let head = read_response_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 101"), "unexpected response: {head}");

    let record = logger.single_record();
    assert!(record.hijacked);
    assert_eq!(record.status, 101);
    assert_eq!(record.method_label(), HIJACKED);
}
