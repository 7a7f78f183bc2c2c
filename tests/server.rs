//! Delivery server tests over a raw TCP socket

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use frame_relay::registry::SubscriberRegistry;
use frame_relay::server::RelayServer;
use frame_relay::{RelayConfig, Shutdown};

async fn start_server() -> (std::net::SocketAddr, Arc<SubscriberRegistry>, Shutdown) {
    let registry = Arc::new(SubscriberRegistry::new());
    let server = RelayServer::new(&RelayConfig::default(), Arc::clone(&registry));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stop = shutdown.signal();
    tokio::spawn(async move { server.serve(listener, stop).await });

    (addr, registry, shutdown)
}

/// Read until the end of the HTTP response head
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "connection closed mid-response");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

async fn upgrade(addr: std::net::SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /ws HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let head = read_head(&mut stream).await;
    assert!(head.starts_with("HTTP/1.1 101"), "{}", head);
    stream
}

async fn wait_for_len(registry: &SubscriberRegistry, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while registry.len().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("registry never reached {} subscribers", expected));
}

async fn deliver_to_all(registry: &SubscriberRegistry, payload: &'static [u8]) {
    for handle in registry.snapshot().await {
        handle.deliver(Bytes::from_static(payload)).unwrap();
    }
}

/// Read one unmasked server frame, expecting FIN + binary with a short payload
async fn read_binary(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x82);
    assert!(header[1] < 126);

    let mut payload = vec![0u8; header[1] as usize];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

/// Client frame: FIN + `opcode`, masked as clients must
fn client_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mask = [0x37, 0xfa, 0x21, 0x3d];
    let mut frame = vec![0x80 | opcode, 0x80 | payload.len() as u8];
    frame.extend_from_slice(&mask);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    frame
}

#[tokio::test]
async fn test_landing_page() {
    let (addr, _registry, shutdown) = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains("/static/index.html"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_websocket_subscriber_lifecycle() {
    let (addr, registry, shutdown) = start_server().await;

    let mut stream = upgrade(addr).await;
    wait_for_len(&registry, 1).await;

    deliver_to_all(&registry, b"frame").await;
    assert_eq!(read_binary(&mut stream).await, b"frame");

    drop(stream);
    wait_for_len(&registry, 0).await;

    shutdown.trigger();
}

#[tokio::test]
async fn test_inbound_messages_are_ignored() {
    let (addr, registry, shutdown) = start_server().await;

    let mut stream = upgrade(addr).await;
    wait_for_len(&registry, 1).await;

    stream.write_all(&client_frame(0x1, b"hello")).await.unwrap();
    stream.write_all(&client_frame(0x2, &[1, 2, 3])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.len().await, 1);

    deliver_to_all(&registry, b"after").await;
    assert_eq!(read_binary(&mut stream).await, b"after");
    assert_eq!(registry.len().await, 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_client_close_frame_unregisters() {
    let (addr, registry, shutdown) = start_server().await;

    let mut stream = upgrade(addr).await;
    wait_for_len(&registry, 1).await;

    // Close with status 1000
    stream.write_all(&client_frame(0x8, &[0x03, 0xe8])).await.unwrap();
    wait_for_len(&registry, 0).await;

    shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_releases_subscribers() {
    let (addr, registry, shutdown) = start_server().await;

    let _first = upgrade(addr).await;
    let _second = upgrade(addr).await;
    wait_for_len(&registry, 2).await;

    shutdown.trigger();
    wait_for_len(&registry, 0).await;
}
