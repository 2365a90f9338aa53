use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use micro_scgi::chain::{Chain, Processor};
use micro_scgi::client::Client;
use micro_scgi::protocol::{BoxError, Request, Response};
use micro_scgi_server::middleware::{LoggingMiddleware, QueryStringMiddleware};
use micro_scgi_server::{Listener, ListenerState, ServerError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const WAIT: Duration = Duration::from_secs(10);

/// Answers every path the tests need.
#[derive(Default)]
struct TestApp {
    seen: Mutex<HashMap<String, usize>>,
}

#[async_trait::async_trait]
impl Processor for TestApp {
    async fn process(&self, request: &mut Request, response: &mut Response) -> Result<(), BoxError> {
        match request.path_info().unwrap_or("/") {
            "/hello" => {
                let name = request.parameter("name").and_then(|name| name.as_str()).unwrap_or("World").to_string();
                response.plain()?;
                response.write_str(&format!("Hello {name}")).await?;
            }
            "/echo" => {
                let body = request.read_body().await?;
                response.content_type("application/octet-stream".parse()?)?;
                response.write(&body).await?;
            }
            "/count" => {
                let id = request.variable("X_REQUEST_ID").unwrap_or("-").to_string();
                tokio::time::sleep(Duration::from_millis(5)).await;
                *self.seen.lock().unwrap().entry(id.clone()).or_default() += 1;
                response.plain()?;
                response.write_str(&id).await?;
            }
            "/fail" => return Err("application failure".into()),
            "/panic" => panic!("processor panicked"),
            _ => {
                response.not_found()?;
                response.write_str("not found").await?;
            }
        }
        Ok(())
    }
}

async fn start(pool_size: usize, queue_capacity: usize, app: Arc<TestApp>) -> (Listener, SocketAddr) {
    let chain = Chain::builder(app).wrap(QueryStringMiddleware::new()).wrap(LoggingMiddleware::new()).build();
    let mut listener = Listener::builder()
        .address(LOCALHOST)
        .port(0)
        .pool_size(pool_size)
        .queue_capacity(queue_capacity)
        .chain(chain)
        .build()
        .unwrap();
    let addr = listener.start().await.unwrap();
    (listener, addr)
}

async fn get_text(addr: SocketAddr, uri: &str) -> (u16, String) {
    let mut client = Client::new(addr.ip().to_string(), addr.port());
    let mut response = client.get(uri).execute().await.unwrap();
    (response.status().as_u16(), response.text().await.unwrap())
}

#[tokio::test]
async fn hello_world_end_to_end() {
    let (mut listener, addr) = start(2, 4, Arc::default()).await;

    let mut client = Client::new(addr.ip().to_string(), addr.port());
    let mut response = client.get("/hello").execute().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.message(), "OK");
    assert_eq!(response.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(response.header("cache-control"), Some("no-cache, no-store, max-age=0, must-revalidate"));
    assert_eq!(response.text().await.unwrap(), "Hello World");

    assert_eq!(get_text(addr, "/hello?name=scgi").await, (200, "Hello scgi".to_string()));
    assert_eq!(get_text(addr, "/nowhere").await, (404, "not found".to_string()));

    timeout(WAIT, listener.shutdown()).await.unwrap();
    assert_eq!(listener.stats().processed, 3);
}

#[tokio::test]
async fn posts_body_and_query_parameters() {
    let (mut listener, addr) = start(1, 1, Arc::default()).await;

    let mut client = Client::new(addr.ip().to_string(), addr.port());
    let mut response = client.post("/echo", "application/octet-stream", &b"some \x00 binary"[..]).execute().await.unwrap();
    assert_eq!(&response.bytes().await.unwrap()[..], b"some \x00 binary");

    client.reset();
    let mut response = client.get("/hello").query_string().param("name", "a b&c").complete().unwrap().execute().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "Hello a b&c");

    timeout(WAIT, listener.shutdown()).await.unwrap();
}

#[tokio::test]
async fn every_connection_is_served_exactly_once() {
    const WORKERS: usize = 3;
    const CONNECTIONS: usize = 10 * WORKERS;

    let app = Arc::new(TestApp::default());
    let (mut listener, addr) = start(WORKERS, 2, Arc::clone(&app)).await;

    let mut clients = JoinSet::new();
    for id in 0..CONNECTIONS {
        clients.spawn(async move {
            let mut client = Client::new(addr.ip().to_string(), addr.port());
            client.set_var("X_REQUEST_ID", id.to_string());
            let mut response = client.get("/count").execute().await.unwrap();
            assert_eq!(response.status().as_u16(), 200);
            assert_eq!(response.text().await.unwrap(), id.to_string());
        });
    }
    timeout(WAIT, async {
        while let Some(joined) = clients.join_next().await {
            joined.unwrap();
        }
    })
    .await
    .unwrap();

    timeout(WAIT, listener.shutdown()).await.unwrap();

    let seen = app.seen.lock().unwrap();
    assert_eq!(seen.len(), CONNECTIONS);
    assert!(seen.values().all(|count| *count == 1));

    let stats = listener.stats();
    assert_eq!(stats.accepted, CONNECTIONS as u64);
    assert_eq!(stats.processed, CONNECTIONS as u64);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn idle_listener_stops_promptly() {
    let (mut listener, _addr) = start(4, 8, Arc::default()).await;
    assert_eq!(listener.state(), ListenerState::Running);

    timeout(Duration::from_secs(2), listener.shutdown()).await.unwrap();
    assert_eq!(listener.state(), ListenerState::Stopped);

    // stopping twice is fine
    listener.shutdown().await;
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn shutdown_token_stops_the_listener() {
    let (mut listener, _addr) = start(2, 2, Arc::default()).await;
    let token = listener.shutdown_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    timeout(WAIT, listener.await_shutdown()).await.unwrap();
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn bind_failure_leaves_the_listener_created() {
    let blocker = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut listener =
        Listener::builder().address(LOCALHOST).port(port).pool_size(1).processor(TestApp::default()).build().unwrap();

    let err = listener.start().await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { address, .. } if address.port() == port));
    assert_eq!(listener.state(), ListenerState::Created);
    assert!(listener.local_addr().is_none());

    drop(blocker);
    listener.start().await.unwrap();
    assert_eq!(listener.state(), ListenerState::Running);
    timeout(WAIT, listener.shutdown()).await.unwrap();
}

#[tokio::test]
async fn malformed_connection_does_not_stop_the_worker() {
    let (mut listener, addr) = start(1, 1, Arc::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
    let mut out = Vec::new();
    // a reset instead of a clean close is fine too, nothing may be written back either way
    let _ = timeout(WAIT, stream.read_to_end(&mut out)).await.unwrap();
    assert!(out.is_empty());

    // the envelope is fine but the mandatory SCGI marker is missing
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"17:CONTENT_LENGTH\x000\x00,").await.unwrap();
    let mut out = Vec::new();
    let _ = timeout(WAIT, stream.read_to_end(&mut out)).await.unwrap();
    assert!(out.is_empty());

    assert_eq!(get_text(addr, "/hello").await, (200, "Hello World".to_string()));

    timeout(WAIT, listener.shutdown()).await.unwrap();
    let stats = listener.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.processed, 1);
}

#[tokio::test]
async fn processor_failure_sends_internal_error() {
    let (mut listener, addr) = start(1, 1, Arc::default()).await;

    assert_eq!(get_text(addr, "/fail").await, (500, "Internal Server Error".to_string()));
    assert_eq!(get_text(addr, "/hello").await, (200, "Hello World".to_string()));

    timeout(WAIT, listener.shutdown()).await.unwrap();
}

#[tokio::test]
async fn panicking_processor_does_not_kill_the_worker() {
    let (mut listener, addr) = start(1, 1, Arc::default()).await;

    let mut client = Client::new(addr.ip().to_string(), addr.port());
    assert!(client.get("/panic").execute().await.is_err());

    assert_eq!(get_text(addr, "/hello").await, (200, "Hello World".to_string()));

    timeout(WAIT, listener.shutdown()).await.unwrap();
    assert_eq!(listener.stats().failed, 1);
}

#[tokio::test]
async fn silent_connection_times_out_and_frees_the_worker() {
    let mut listener = Listener::builder()
        .address(LOCALHOST)
        .port(0)
        .pool_size(1)
        .queue_capacity(1)
        .read_timeout(Duration::from_millis(200))
        .processor(TestApp::default())
        .build()
        .unwrap();
    let addr = listener.start().await.unwrap();

    let idle = TcpStream::connect(addr).await.unwrap();
    let served = timeout(WAIT, get_text(addr, "/hello")).await.unwrap();
    assert_eq!(served, (200, "Hello World".to_string()));

    timeout(WAIT, listener.shutdown()).await.unwrap();
    assert_eq!(listener.stats().failed, 1);
    drop(idle);
}

#[tokio::test]
async fn shutdown_abandons_a_stalled_connection_after_the_grace_period() {
    let mut listener = Listener::builder()
        .address(LOCALHOST)
        .port(0)
        .pool_size(1)
        .read_timeout(Duration::from_secs(600))
        .shutdown_grace(Duration::from_millis(100))
        .processor(TestApp::default())
        .build()
        .unwrap();
    let addr = listener.start().await.unwrap();

    let idle = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(3), listener.shutdown()).await.unwrap();
    assert_eq!(listener.state(), ListenerState::Stopped);
    drop(idle);
}
