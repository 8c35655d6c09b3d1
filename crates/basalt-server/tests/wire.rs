//! End-to-end wire tests: literal request bytes in, literal reply
//! bytes out, against a live listener on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use basalt_core::Db;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server() -> (tempfile::TempDir, SocketAddr) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db = Arc::new(Db::open(dir.path()).expect("open db"));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(basalt_server::serve(listener, db));
    (dir, addr)
}

/// Builds a multi-bulk request from argument parts.
fn req(parts: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Sends a request and reads exactly `expected_len` reply bytes.
async fn exchange(stream: &mut TcpStream, request: &[u8], expected_len: usize) -> Vec<u8> {
    stream.write_all(request).await.expect("write request");
    let mut buf = vec![0u8; expected_len];
    stream.read_exact(&mut buf).await.expect("read reply");
    buf
}

#[tokio::test]
async fn ping_pong() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let reply = exchange(&mut stream, b"*1\r\n$4\r\nPING\r\n", 7).await;
    assert_eq!(reply, b"+PONG\r\n");
}

#[tokio::test]
async fn inline_ping() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let reply = exchange(&mut stream, b"PING\r\n", 7).await;
    assert_eq!(reply, b"+PONG\r\n");
}

#[tokio::test]
async fn set_then_get() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let reply = exchange(&mut stream, &req(&["SET", "foo", "bar"]), 5).await;
    assert_eq!(reply, b"+OK\r\n");

    let reply = exchange(&mut stream, &req(&["GET", "foo"]), 9).await;
    assert_eq!(reply, b"$3\r\nbar\r\n");
}

#[tokio::test]
async fn hash_round_trip_streams_in_field_order() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(
        exchange(&mut stream, &req(&["HSET", "h", "f1", "v1"]), 4).await,
        b":1\r\n"
    );
    assert_eq!(
        exchange(&mut stream, &req(&["HSET", "h", "f2", "v2"]), 4).await,
        b":1\r\n"
    );
    assert_eq!(
        exchange(&mut stream, &req(&["HLEN", "h"]), 4).await,
        b":2\r\n"
    );
    assert_eq!(
        exchange(&mut stream, &req(&["HGETALL", "h"]), 36).await,
        b"*4\r\n$2\r\nf1\r\n$2\r\nv1\r\n$2\r\nf2\r\n$2\r\nv2\r\n"
    );
}

#[tokio::test]
async fn sorted_set_range_by_score() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    exchange(&mut stream, &req(&["ZADD", "z", "1", "a"]), 4).await;
    exchange(&mut stream, &req(&["ZADD", "z", "2", "b"]), 4).await;
    exchange(&mut stream, &req(&["ZADD", "z", "1.5", "c"]), 4).await;

    let reply = exchange(&mut stream, &req(&["ZRANGEBYSCORE", "z", "1", "2"]), 25).await;
    assert_eq!(reply, b"*3\r\n$1\r\na\r\n$1\r\nc\r\n$1\r\nb\r\n");
}

#[tokio::test]
async fn set_intersection_any_order() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    exchange(&mut stream, &req(&["SADD", "s1", "a", "b", "c"]), 4).await;
    exchange(&mut stream, &req(&["SADD", "s2", "b", "c", "d"]), 4).await;

    let reply = exchange(&mut stream, &req(&["SINTER", "s1", "s2"]), 18).await;
    assert!(reply.starts_with(b"*2\r\n"));
    let body = &reply[4..];
    assert!(
        body == b"$1\r\nb\r\n$1\r\nc\r\n" || body == b"$1\r\nc\r\n$1\r\nb\r\n",
        "unexpected intersection body: {body:?}"
    );
}

#[tokio::test]
async fn type_of_missing_key_is_none() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let reply = exchange(&mut stream, &req(&["TYPE", "none-such"]), 7).await;
    assert_eq!(reply, b"+none\r\n");
}

#[tokio::test]
async fn pipelined_requests_reply_in_order() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut pipelined = req(&["SET", "k", "v"]);
    pipelined.extend_from_slice(&req(&["GET", "k"]));
    pipelined.extend_from_slice(&req(&["PING"]));

    let reply = exchange(&mut stream, &pipelined, 5 + 7 + 7).await;
    assert_eq!(reply, b"+OK\r\n$1\r\nv\r\n+PONG\r\n");
}

#[tokio::test]
async fn unknown_command_keeps_session_alive() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&req(&["NOPE"])).await.unwrap();
    let mut line = vec![0u8; b"-ERR unknown command 'NOPE'\r\n".len()];
    stream.read_exact(&mut line).await.unwrap();
    assert_eq!(line, b"-ERR unknown command 'NOPE'\r\n");

    // still usable afterwards
    let reply = exchange(&mut stream, b"*1\r\n$4\r\nPING\r\n", 7).await;
    assert_eq!(reply, b"+PONG\r\n");
}

#[tokio::test]
async fn protocol_error_closes_connection() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // bulk payload not followed by CRLF
    stream.write_all(b"*1\r\n$4\r\nPINGxx").await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"-ERR Protocol error: invalid bulk terminator\r\n");
}

#[tokio::test]
async fn del_behaves_as_if_key_never_existed() {
    let (_dir, addr) = start_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    exchange(&mut stream, &req(&["SET", "gone", "v"]), 5).await;
    assert_eq!(
        exchange(&mut stream, &req(&["DEL", "gone"]), 4).await,
        b":1\r\n"
    );
    assert_eq!(
        exchange(&mut stream, &req(&["GET", "gone"]), 5).await,
        b"$-1\r\n"
    );
    assert_eq!(
        exchange(&mut stream, &req(&["TYPE", "gone"]), 7).await,
        b"+none\r\n"
    );
}
