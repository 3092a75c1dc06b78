//! End-to-end tests: a real server on an ephemeral port, driven by the
//! async client and by raw sockets.

use catchdb::client::{Client, ClientError};
use catchdb::config::Config;
use catchdb::protocol::{encode_request, Reply, ReplyStatus};
use catchdb::server::{Server, ShutdownHandle};
use catchdb::storage::{MemStore, StoreOptions};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start(config: Config, open: impl FnOnce() -> MemStore + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel();
        let thread = std::thread::spawn(move || {
            let mut server = Server::bind(&config, open()).expect("bind");
            let addr = server.local_addr().expect("bound address");
            tx.send((addr, server.shutdown_handle())).expect("send addr");
            server.run().expect("run");
        });
        let (addr, shutdown) = rx.recv().expect("server started");
        Self {
            addr,
            shutdown,
            thread: Some(thread),
        }
    }

    fn memory() -> Self {
        Self::start(local_config().build(), MemStore::new)
    }

    fn stop(mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().expect("server thread");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn local_config() -> catchdb::config::ConfigBuilder {
    Config::builder().bind(LOCALHOST).port(0)
}

fn durable(dir: &Path) -> impl FnOnce() -> MemStore + Send + 'static {
    let dir = dir.to_path_buf();
    move || {
        let options = StoreOptions {
            sync: true,
            ..StoreOptions::default()
        };
        MemStore::open(&dir, options).expect("open store")
    }
}

fn blocks(reply: &Reply) -> Vec<&[u8]> {
    reply.blocks.iter().map(|b| &b[..]).collect()
}

#[tokio::test]
async fn test_flat_keys() {
    let server = TestServer::memory();
    let mut client = Client::connect(server.addr).await.unwrap();

    assert!(client.set("foo", "bar").await.unwrap().is_ok());
    assert_eq!(client.get("foo").await.unwrap().as_deref(), Some(&b"bar"[..]));

    let reply = client.request(&["del", "foo"]).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Ok);

    let reply = client.request(&["get", "foo"]).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::NotFound);
    assert_eq!(client.get("foo").await.unwrap(), None);
}

#[tokio::test]
async fn test_hash_round_trip() {
    let server = TestServer::memory();
    let mut client = Client::connect(server.addr).await.unwrap();

    client.request(&["hset", "users", "bob", "2"]).await.unwrap();
    client.request(&["hset", "users", "alice", "1"]).await.unwrap();

    let reply = client.request(&["hsize", "users"]).await.unwrap();
    assert_eq!(blocks(&reply), vec![&b"2"[..]]);

    let reply = client.request(&["hgetall", "users"]).await.unwrap();
    assert!(reply.is_ok());
    assert_eq!(blocks(&reply), vec![&b"bob"[..], &b"2"[..], &b"alice"[..], &b"1"[..]]);

    let reply = client.request(&["hget", "users", "carol"]).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::NotFound);
}

#[tokio::test]
async fn test_queue_round_trip() {
    let server = TestServer::memory();
    let mut client = Client::connect(server.addr).await.unwrap();

    let reply = client.request(&["multi_qpush_back", "jobs", "a", "b"]).await.unwrap();
    assert_eq!(blocks(&reply), vec![&b"2"[..]]);
    client.request(&["qpush_front", "jobs", "z"]).await.unwrap();

    let reply = client.request(&["qpop_front", "jobs"]).await.unwrap();
    assert_eq!(blocks(&reply), vec![&b"z"[..]]);
    let reply = client.request(&["qpop_back", "jobs"]).await.unwrap();
    assert_eq!(blocks(&reply), vec![&b"b"[..]]);
    let reply = client.request(&["qsize", "jobs"]).await.unwrap();
    assert_eq!(blocks(&reply), vec![&b"1"[..]]);
}

#[tokio::test]
async fn test_zset_top_n() {
    let server = TestServer::memory();
    let mut client = Client::connect(server.addr).await.unwrap();

    client.request(&["zset", "board", "carol", "30"]).await.unwrap();
    client.request(&["zset", "board", "alice", "-5"]).await.unwrap();
    client.request(&["zset", "board", "bob", "10"]).await.unwrap();

    let reply = client.request(&["ztopn", "board", "2"]).await.unwrap();
    assert!(reply.is_ok());
    assert_eq!(blocks(&reply), vec![&b"alice"[..], &b"-5"[..], &b"bob"[..], &b"10"[..]]);

    let reply = client.request(&["ztopn", "board", "-1"]).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::ClientError);
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = TestServer::memory();
    let mut client = Client::connect(server.addr).await.unwrap();

    let reply = client.request(&["frobnicate", "x"]).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::ClientError);
    assert_eq!(blocks(&reply), vec![&b"Unknown command"[..]]);

    let reply = client.request(&["get"]).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::ClientError);
    assert_eq!(blocks(&reply), vec![&b"Wrong number of arguments"[..]]);

    // The connection stays usable after client errors
    assert!(client.set("k", "v").await.unwrap().is_ok());
}

#[tokio::test]
async fn test_pipelined_requests() {
    let server = TestServer::memory();
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    let mut batch = encode_request(&["set", "a", "1"]);
    batch.extend_from_slice(&encode_request(&["set", "b", "2"]));
    batch.extend_from_slice(&encode_request(&["get", "b"]));
    stream.write_all(&batch).await.unwrap();

    let mut received = Vec::new();
    let mut replies = Vec::new();
    let mut chunk = [0u8; 256];
    while replies.len() < 3 {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "server closed before answering every request");
        received.extend_from_slice(&chunk[..n]);
        while let Some((reply, consumed)) = Reply::parse(&received).unwrap() {
            received.drain(..consumed);
            replies.push(reply);
        }
    }

    assert!(replies.iter().all(Reply::is_ok));
    assert_eq!(blocks(&replies[2]), vec![&b"2"[..]]);
}

#[tokio::test]
async fn test_request_larger_than_query_buffer() {
    let server = TestServer::start(local_config().query_buffer_size(64).build(), MemStore::new);
    let mut client = Client::connect(server.addr).await.unwrap();

    let mut request = vec!["multi_set".to_string()];
    for i in 0..50 {
        request.push(format!("key{i:02}"));
        request.push(format!("value-{i:02}"));
    }
    assert!(encode_request(&request).len() > 64 * 4);

    let reply = tokio::time::timeout(Duration::from_secs(5), client.request(&request))
        .await
        .expect("server should answer a request spanning several buffer fills")
        .unwrap();
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(blocks(&reply), vec![&b"50"[..]]);

    assert_eq!(client.get("key49").await.unwrap().as_deref(), Some(&b"value-49"[..]));

    let reply = client.request(&["hset", "h", "", "v"]).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::ClientError);
}

#[tokio::test]
async fn test_malformed_request_closes_connection() {
    let server = TestServer::memory();
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream.write_all(b"x3\nget\n\n").await.unwrap();

    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server should close the connection")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_max_clients() {
    let server = TestServer::start(local_config().max_clients(1).build(), MemStore::new);

    let mut first = Client::connect(server.addr).await.unwrap();
    assert!(first.set("k", "v").await.unwrap().is_ok());

    // Accepted by the kernel, then dropped by the server
    let mut second = Client::connect(server.addr).await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), second.request(&["get", "k"]))
        .await
        .expect("rejected client should see the connection close");
    assert!(matches!(
        result,
        Err(ClientError::ConnectionClosed) | Err(ClientError::Io(_))
    ));

    // The first client is unaffected
    assert_eq!(first.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));
}

#[tokio::test]
async fn test_clients_share_data() {
    let server = TestServer::memory();
    let mut writer = Client::connect(server.addr).await.unwrap();
    let mut reader = Client::connect(server.addr).await.unwrap();

    writer.request(&["hset", "h", "f", "1"]).await.unwrap();
    writer.request(&["hincr", "h", "f", "41"]).await.unwrap();

    let reply = reader.request(&["hget", "h", "f"]).await.unwrap();
    assert_eq!(blocks(&reply), vec![&b"42"[..]]);
}

#[test]
fn test_data_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let server = TestServer::start(local_config().build(), durable(dir.path()));
    tokio_test::block_on(async {
        let mut client = Client::connect(server.addr).await.unwrap();
        client.set("greeting", "hello").await.unwrap();
        client.request(&["multi_qpush_back", "q", "one", "two"]).await.unwrap();
        client.request(&["zset", "z", "m", "7"]).await.unwrap();
    });
    server.stop();

    let server = TestServer::start(local_config().build(), durable(dir.path()));
    tokio_test::block_on(async {
        let mut client = Client::connect(server.addr).await.unwrap();
        assert_eq!(
            client.get("greeting").await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );

        let reply = client.request(&["qpop_front", "q"]).await.unwrap();
        assert_eq!(blocks(&reply), vec![&b"one"[..]]);

        let reply = client.request(&["zget", "z", "m"]).await.unwrap();
        assert_eq!(blocks(&reply), vec![&b"7"[..]]);
    });
    server.stop();
}
