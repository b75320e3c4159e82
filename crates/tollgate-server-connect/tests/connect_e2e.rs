//! End-to-end CONNECT tests against a real loopback listener
//!
//! Each test starts a proxy on 127.0.0.1:0 and talks raw HTTP/1.1 to it, the
//! same way curl or a browser would.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tollgate_accounts::{Account, AccountStore, Consumption, MemoryAccountStore, StoreError};
use tollgate_auth::{JwtVerifier, ProxyCredential};
use tollgate_server_connect::{
    AccessRecord, AccessSink, ConnectHandler, FanoutAccessSink, ProxyServer, ProxyServerConfig,
    QuotaGate, RecordingAccessSink, SinkError, TunnelEstablisher,
};

const SECRET: &[u8] = b"e2e_secret_key_1234567890";

struct Proxy {
    addr: SocketAddr,
    sink: Arc<RecordingAccessSink>,
}

async fn start_proxy(store: Arc<dyn AccountStore>) -> Proxy {
    let sink = Arc::new(RecordingAccessSink::new());
    let handler = Arc::new(ConnectHandler::new(
        Arc::new(JwtVerifier::new(SECRET)),
        QuotaGate::new(store),
        TunnelEstablisher::new(Duration::from_secs(2)),
        FanoutAccessSink::new().with_sink(sink.clone() as Arc<dyn AccessSink>),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ProxyServerConfig { bind_addr: addr };
    tokio::spawn(ProxyServer::new(config, handler).serve(listener));

    Proxy { addr, sink }
}

/// Destination that reads `expect` bytes, answers with `reply`, then closes
async fn start_destination(expect: usize, reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = vec![0u8; expect];
                if socket.read_exact(&mut request).await.is_ok() {
                    let _ = socket.write_all(reply).await;
                }
            });
        }
    });

    addr
}

fn basic(token: &str) -> String {
    ProxyCredential {
        attribution: "svc".to_string(),
        token: token.to_string(),
    }
    .to_header_value()
}

struct ProxyResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    stream: TcpStream,
}

impl ProxyResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Send a raw request line plus headers and read the response head.
///
/// The head is read byte by byte so no tunnel bytes are consumed.
async fn send(proxy: SocketAddr, request_line: &str, authorization: Option<&str>) -> ProxyResponse {
    let mut stream = TcpStream::connect(proxy).await.unwrap();

    let mut request = format!("{}\r\nHost: localhost\r\n", request_line);
    if let Some(value) = authorization {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", value));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }

    let head = String::from_utf8(head).unwrap();
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).await.unwrap();

    ProxyResponse {
        status,
        headers,
        body,
        stream,
    }
}

async fn connect(proxy: SocketAddr, target: &str, authorization: Option<&str>) -> ProxyResponse {
    send(proxy, &format!("CONNECT {} HTTP/1.1", target), authorization).await
}

fn seeded_store(limit: i64, count: i64) -> (Arc<MemoryAccountStore>, String, String) {
    let mut account = Account::new("svc", limit);
    account.call_count = count;
    let id = account.id.clone();
    let token = JwtVerifier::new(SECRET).issue(&id).unwrap();
    (
        Arc::new(MemoryAccountStore::with_accounts([account])),
        id,
        token,
    )
}

mockall::mock! {
    Store {}

    #[async_trait]
    impl AccountStore for Store {
        async fn get(&self, id: &str) -> Result<Option<Account>, StoreError>;
        async fn create(&self, account: Account) -> Result<Account, StoreError>;
        async fn update(&self, account: Account) -> Result<(), StoreError>;
        async fn try_consume(&self, id: &str) -> Result<Consumption, StoreError>;
    }
}

/// Panics on the first `try_consume`, then behaves
struct PanicOnceStore {
    inner: MemoryAccountStore,
    tripped: AtomicBool,
}

#[async_trait]
impl AccountStore for PanicOnceStore {
    async fn get(&self, id: &str) -> Result<Option<Account>, StoreError> {
        self.inner.get(id).await
    }

    async fn create(&self, account: Account) -> Result<Account, StoreError> {
        self.inner.create(account).await
    }

    async fn update(&self, account: Account) -> Result<(), StoreError> {
        self.inner.update(account).await
    }

    async fn try_consume(&self, id: &str) -> Result<Consumption, StoreError> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("injected store fault");
        }
        self.inner.try_consume(id).await
    }
}

/// Panics on the first record, then drops records silently
#[derive(Default)]
struct PanicOnceSink {
    tripped: AtomicBool,
}

#[async_trait]
impl AccessSink for PanicOnceSink {
    async fn record(&self, _record: &AccessRecord) -> Result<(), SinkError> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            panic!("injected sink fault");
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_granted_tunnel_relays_and_counts_one_call() {
    const P1: &[u8] = b"ping from the client";
    const P2: &[u8] = b"a somewhat longer pong from the destination";

    let (store, id, token) = seeded_store(5, 0);
    let proxy = start_proxy(store.clone()).await;
    let destination = start_destination(P1.len(), P2).await;

    let mut response = connect(proxy.addr, &destination.to_string(), Some(&basic(&token))).await;
    assert_eq!(response.status, 200);
    assert_eq!(store.get(&id).await.unwrap().unwrap().call_count, 1);

    response.stream.write_all(P1).await.unwrap();
    let mut received = Vec::new();
    response.stream.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, P2);

    let records = tokio::time::timeout(Duration::from_secs(5), proxy.sink.wait_for_records(1))
        .await
        .expect("tunnel should be logged");
    let record = &records[0];
    assert_eq!(record.attribution, "svc");
    assert_eq!(record.account_id, id);
    assert_eq!(record.destination, destination.to_string());
    assert_eq!(record.bytes_from_client, P1.len() as u64);
    assert_eq!(record.bytes_from_destination, P2.len() as u64);
    assert_eq!(record.total_bytes(), (P1.len() + P2.len()) as u64);
}

#[tokio::test]
async fn test_exhausted_quota_is_429_and_unchanged() {
    let (store, id, token) = seeded_store(2, 2);
    let proxy = start_proxy(store.clone()).await;

    let response = connect(proxy.addr, "127.0.0.1:9", Some(&basic(&token))).await;

    assert_eq!(response.status, 429);
    assert_eq!(response.header("x-proxy-error"), Some("Rate limit exceeded"));
    assert_eq!(
        response.json(),
        serde_json::json!({ "message": "Rate limit exceeded" })
    );
    assert_eq!(store.get(&id).await.unwrap().unwrap().call_count, 2);
}

#[tokio::test]
async fn test_limit_two_grants_twice_then_refuses() {
    let (store, id, token) = seeded_store(2, 0);
    let proxy = start_proxy(store.clone()).await;
    let destination = start_destination(1, b"!").await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = connect(proxy.addr, &destination.to_string(), Some(&basic(&token))).await;
        statuses.push(response.status);
    }

    assert_eq!(statuses, vec![200, 200, 429]);
    assert_eq!(store.get(&id).await.unwrap().unwrap().call_count, 2);
}

#[tokio::test]
async fn test_missing_header_is_407_without_touching_store() {
    // Any call on an unprimed mock panics, which would surface as a 500
    let proxy = start_proxy(Arc::new(MockStore::new())).await;

    let response = connect(proxy.addr, "example.com:443", None).await;

    assert_eq!(response.status, 407);
    assert_eq!(
        response.header("proxy-authenticate"),
        Some("Basic realm=\"tollgate\"")
    );
    assert_eq!(
        response.json(),
        serde_json::json!({ "message": "Proxy authorization required" })
    );
}

#[tokio::test]
async fn test_bad_header_forms_are_400_without_touching_store() {
    let proxy = start_proxy(Arc::new(MockStore::new())).await;

    let cases = [
        "Bearer abc.def.ghi",
        "Basic !!!not-base64!!!",
        // base64("no-colon-here")
        "Basic bm8tY29sb24taGVyZQ==",
        // base64("a:b:c")
        "Basic YTpiOmM=",
        "Basic",
    ];

    for header in cases {
        let response = connect(proxy.addr, "example.com:443", Some(header)).await;
        assert_eq!(response.status, 400, "header {:?}", header);
        assert_eq!(
            response.header("x-proxy-error"),
            Some("Invalid proxy authorization header")
        );
    }
}

#[tokio::test]
async fn test_foreign_tokens_are_400_without_touching_store() {
    let proxy = start_proxy(Arc::new(MockStore::new())).await;

    let foreign_secret = JwtVerifier::new(b"someone-elses-secret")
        .issue("acct-1")
        .unwrap();
    let wrong_algorithm = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS512),
        &serde_json::json!({ "id": "acct-1" }),
        &jsonwebtoken::EncodingKey::from_secret(SECRET),
    )
    .unwrap();

    for token in [foreign_secret, wrong_algorithm] {
        let response = connect(proxy.addr, "example.com:443", Some(&basic(&token))).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.header("x-proxy-error"), Some("Invalid JWT"));
    }
}

#[tokio::test]
async fn test_unknown_account_is_401() {
    let proxy = start_proxy(Arc::new(MemoryAccountStore::new())).await;
    let token = JwtVerifier::new(SECRET).issue("ghost").unwrap();

    let response = connect(proxy.addr, "example.com:443", Some(&basic(&token))).await;

    assert_eq!(response.status, 401);
    assert_eq!(
        response.json(),
        serde_json::json!({ "message": "Account not found for API key: ghost" })
    );
}

#[tokio::test]
async fn test_unreachable_destination_is_503_json() {
    let (store, _id, token) = seeded_store(5, 0);
    let proxy = start_proxy(store).await;

    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = closed.local_addr().unwrap().to_string();
    drop(closed);

    let response = connect(proxy.addr, &target, Some(&basic(&token))).await;

    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert!(response.json()["message"]
        .as_str()
        .unwrap()
        .contains(&target));
}

#[tokio::test]
async fn test_injected_fault_is_500_for_that_request_only() {
    let account = Account::new("svc", 5);
    let id = account.id.clone();
    let token = JwtVerifier::new(SECRET).issue(&id).unwrap();
    let store = Arc::new(PanicOnceStore {
        inner: MemoryAccountStore::with_accounts([account]),
        tripped: AtomicBool::new(false),
    });
    let proxy = start_proxy(store.clone()).await;
    let destination = start_destination(1, b"!").await;

    let first = connect(proxy.addr, &destination.to_string(), Some(&basic(&token))).await;
    assert_eq!(first.status, 500);
    assert_eq!(
        first.json(),
        serde_json::json!({ "message": "Internal server error" })
    );

    let second = connect(proxy.addr, &destination.to_string(), Some(&basic(&token))).await;
    assert_eq!(second.status, 200);
    assert_eq!(store.get(&id).await.unwrap().unwrap().call_count, 1);
}

#[tokio::test]
async fn test_plain_http_request_is_405() {
    let proxy = start_proxy(Arc::new(MockStore::new())).await;

    let response = send(proxy.addr, "GET /anything HTTP/1.1", None).await;

    assert_eq!(response.status, 405);
    assert_eq!(
        response.json(),
        serde_json::json!({ "message": "Method not allowed" })
    );
}

#[tokio::test]
async fn test_mounted_routes_share_the_listener() {
    use axum::routing::get;

    let handler = Arc::new(ConnectHandler::new(
        Arc::new(JwtVerifier::new(SECRET)),
        QuotaGate::new(Arc::new(MockStore::new())),
        TunnelEstablisher::default(),
        FanoutAccessSink::new(),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(ProxyServerConfig { bind_addr: addr }, handler)
        .with_routes(axum::Router::new().route("/ping", get(|| async { "pong" })));
    tokio::spawn(server.serve(listener));

    let response = send(addr, "GET /ping HTTP/1.1", None).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"pong");

    let response = send(addr, "DELETE /ping HTTP/1.1", None).await;
    assert_eq!(response.status, 405);
    assert_eq!(
        response.json(),
        serde_json::json!({ "message": "Method not allowed" })
    );
}

#[tokio::test]
async fn test_tunnel_fault_leaves_later_tunnels_working() {
    const P1: &[u8] = b"first";
    const P2: &[u8] = b"second reply";

    let (store, id, token) = seeded_store(5, 0);
    let recording = Arc::new(RecordingAccessSink::new());
    let handler = Arc::new(ConnectHandler::new(
        Arc::new(JwtVerifier::new(SECRET)),
        QuotaGate::new(store.clone()),
        TunnelEstablisher::new(Duration::from_secs(2)),
        FanoutAccessSink::new()
            .with_sink(Arc::new(PanicOnceSink::default()))
            .with_sink(recording.clone()),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(
        ProxyServer::new(ProxyServerConfig { bind_addr: addr }, handler).serve(listener),
    );
    let destination = start_destination(P1.len(), P2).await;

    // The first tunnel's task panics while logging, after its bytes are relayed
    let mut first = connect(addr, &destination.to_string(), Some(&basic(&token))).await;
    assert_eq!(first.status, 200);
    first.stream.write_all(P1).await.unwrap();
    let mut received = Vec::new();
    first.stream.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, P2);

    let mut second = connect(addr, &destination.to_string(), Some(&basic(&token))).await;
    assert_eq!(second.status, 200);
    second.stream.write_all(P1).await.unwrap();
    let mut received = Vec::new();
    second.stream.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, P2);

    let records = tokio::time::timeout(Duration::from_secs(5), recording.wait_for_records(1))
        .await
        .expect("second tunnel should be logged");
    assert_eq!(records[0].bytes_from_client, P1.len() as u64);
    assert_eq!(records[0].bytes_from_destination, P2.len() as u64);
    assert_eq!(store.get(&id).await.unwrap().unwrap().call_count, 2);
    assert!(!server.is_finished());
}

#[tokio::test]
async fn test_server_keeps_accepting_after_aborted_clients() {
    let handler = Arc::new(ConnectHandler::new(
        Arc::new(JwtVerifier::new(SECRET)),
        QuotaGate::new(Arc::new(MockStore::new())),
        TunnelEstablisher::default(),
        FanoutAccessSink::new(),
    ));

    // Reserve a free port, then let start() bind it
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);
    let server = tokio::spawn(
        ProxyServer::new(ProxyServerConfig { bind_addr: addr }, handler).start(),
    );

    let mut ready = false;
    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ready, "proxy should start listening");

    // Clients that vanish before, during and after sending a request
    for i in 0..64 {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        match i % 3 {
            0 => {}
            1 => {
                let _ = stream.write_all(b"CONNECT example.com:443 HT").await;
            }
            _ => {
                let _ = stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
            }
        }
        drop(stream);
    }

    let response = send(addr, "GET /anything HTTP/1.1", None).await;
    assert_eq!(response.status, 405);
    assert!(!server.is_finished());
}
