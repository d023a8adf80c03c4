//! Integration tests for whatels-client.
//!
//! A scripted server on a local TCP port plays the indexer.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use whatels_client::codec::{Codec, Dialect, Message};
use whatels_client::protocol::{build_frame, Frame, FrameBuffer};
use whatels_client::{
    Client, ConnectionState, Symbols, TempDirMaterializer, WatchEvent, WhatelsError,
};

const EMPTY: &str = r#"{"functions":[],"errors":[]}"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Server side of one accepted connection.
struct FakeServer {
    stream: TcpStream,
    buffer: FrameBuffer,
}

impl FakeServer {
    async fn next_frame(&mut self) -> Frame {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(frame) = self.buffer.try_extract_one().unwrap() {
                return frame;
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed the connection");
            self.buffer.extend(&buf[..n]);
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn push(&mut self, path: &str, json: &str) {
        let payload = format!("{}\r\n{}", path, json);
        self.send(&build_frame("path-symbols", payload.as_bytes()))
            .await;
    }
}

/// Bind a listener and connect a client to it.
async fn connected(dialect: Dialect) -> (Client, FakeServer) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut client = Client::builder().port(port).dialect(dialect).build();
    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    let (stream, _) = accepted.unwrap();

    (
        client,
        FakeServer {
            stream,
            buffer: FrameBuffer::new(),
        },
    )
}

fn function_json(name: &str, arity: u32, line: u32) -> String {
    format!(
        r#"{{"module":"m","functions":[{{"module":"m","name":"{}","arity":{},"line":{}}}],"errors":[]}}"#,
        name, arity, line
    )
}

/// Encoding a request and decoding it again yields the same opcode and payload.
#[test]
fn test_request_roundtrip_through_framer() {
    let codec = Codec::new(Dialect::PathSymbols);
    let payloads = ["/a.erl", "", "/dir with spaces/ünïcödé.erl", "*.{erl,hrl}"];

    for payload in payloads {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&codec.encode_query(payload)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode(), "path-symbols?");
        assert_eq!(frames[0].payload(), payload.as_bytes());

        let frames = buffer.push(&codec.encode_watch(payload).unwrap()).unwrap();
        assert_eq!(frames[0].opcode(), "watch!");
        assert_eq!(frames[0].payload(), payload.as_bytes());
    }
}

/// Two frames delivered in one chunk decode in order, then to messages.
#[test]
fn test_batched_frames_decode_in_order() {
    let codec = Codec::new(Dialect::PathSymbols);
    let mut data = build_frame("path-symbols", format!("/a.erl\r\n{}", EMPTY).as_bytes()).to_vec();
    data.extend_from_slice(&build_frame(
        "path-symbols",
        format!("/b.erl\r\n{}", function_json("f", 1, 2)).as_bytes(),
    ));

    let frames = FrameBuffer::new().push(&data).unwrap();
    assert_eq!(frames.len(), 2);

    let paths: Vec<String> = frames
        .iter()
        .map(|f| match codec.decode(f).unwrap() {
            Message::PathSymbols(push) => push.path,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(paths, ["/a.erl", "/b.erl"]);
}

#[tokio::test]
async fn test_query_over_tcp() {
    let (client, mut server) = connected(Dialect::PathSymbols).await;
    assert_eq!(client.state(), ConnectionState::Connected);

    let (result, ()) = tokio::join!(client.get_symbols("/a.erl"), async {
        let frame = server.next_frame().await;
        assert_eq!(frame.opcode(), "path-symbols?");
        assert_eq!(frame.payload(), b"/a.erl");
        server
            .send(b"path-symbols 36\r\n/a.erl\r\n{\"functions\":[],\"errors\":[]}\r\n")
            .await;
    });

    assert_eq!(result.unwrap(), Symbols::default());
}

#[tokio::test]
async fn test_query_reply_byte_by_byte() {
    let (client, mut server) = connected(Dialect::PathSymbols).await;

    let (result, ()) = tokio::join!(client.get_symbols("/slow.erl"), async {
        server.next_frame().await;
        let reply = build_frame(
            "path-symbols",
            format!("/slow.erl\r\n{}", function_json("start_link", 1, 9)).as_bytes(),
        );
        for byte in reply.iter() {
            server.send(&[*byte]).await;
            server.stream.flush().await.unwrap();
        }
    });

    let symbols = result.unwrap();
    assert_eq!(symbols.module.as_deref(), Some("m"));
    assert_eq!(symbols.functions[0].display_name(), "start_link/1");
    assert_eq!(symbols.functions[0].line, 9);
}

#[tokio::test]
async fn test_watch_pushes_fill_cache() {
    let (client, mut server) = connected(Dialect::PathSymbols).await;
    let mut sub = client.watch_stream("*.erl").unwrap();

    let frame = server.next_frame().await;
    assert_eq!(frame.opcode(), "watch!");
    assert_eq!(frame.payload(), b"*.erl");

    server.push("/a.erl", &function_json("a", 0, 1)).await;
    server.push("/b.erl", &function_json("b", 0, 1)).await;
    for _ in 0..2 {
        assert!(matches!(sub.recv().await, Some(WatchEvent::Symbols(_))));
    }

    let all = client.get_all_path_symbols();
    assert_eq!(all.len(), 2);
    assert!(all.contains_key("/a.erl"));
    assert!(all.contains_key("/b.erl"));

    server.push("/a.erl", &function_json("a_new", 2, 7)).await;
    assert!(matches!(sub.recv().await, Some(WatchEvent::Symbols(_))));

    let a = client.get_path_symbols("/a.erl").unwrap();
    assert_eq!(a.functions[0].display_name(), "a_new/2");
    assert_eq!(client.get_all_path_symbols().len(), 2);
}

#[tokio::test]
async fn test_plain_watch_is_fire_and_forget() {
    let (client, mut server) = connected(Dialect::PathSymbols).await;

    client.watch("src/*.erl").unwrap();
    client.watch("include/*.hrl").unwrap();

    assert_eq!(server.next_frame().await.payload(), b"src/*.erl");
    assert_eq!(server.next_frame().await.payload(), b"include/*.hrl");
}

#[tokio::test]
async fn test_second_query_does_not_steal_reply() {
    let (client, mut server) = connected(Dialect::PathSymbols).await;
    let client = Arc::new(client);

    let c = client.clone();
    let first = tokio::spawn(async move { c.get_symbols("/first.erl").await });
    server.next_frame().await;

    assert!(matches!(
        client.get_symbols("/second.erl").await,
        Err(WhatelsError::RequestInFlight)
    ));

    server.push("/first.erl", &function_json("one", 1, 1)).await;
    let symbols = first.await.unwrap().unwrap();
    assert_eq!(symbols.functions[0].name, "one");
}

#[tokio::test]
async fn test_inline_source_is_materialized() {
    let (client, mut server) = connected(Dialect::PathSymbols).await;
    let materializer = TempDirMaterializer::new().unwrap();

    let (result, ()) = tokio::join!(
        client.get_symbols_for_source("-module(inline).\nf() -> ok.\n", &materializer),
        async {
            let frame = server.next_frame().await;
            let path = std::str::from_utf8(frame.payload()).unwrap().to_string();
            assert!(path.starts_with(materializer.dir().to_str().unwrap()));
            assert_eq!(
                std::fs::read_to_string(&path).unwrap(),
                "-module(inline).\nf() -> ok.\n"
            );
            server.push(&path, &function_json("f", 0, 2)).await;
        }
    );

    assert_eq!(result.unwrap().functions[0].display_name(), "f/0");
}

#[tokio::test]
async fn test_legacy_dialect_over_tcp() {
    let (client, mut server) = connected(Dialect::Legacy).await;

    let (result, ()) = tokio::join!(client.get_symbols("/old.erl"), async {
        let frame = server.next_frame().await;
        assert_eq!(frame.opcode(), "SYMBOLS?");
        server
            .send(&build_frame(
                "SYMBOLS",
                br#"{"functions":[{"name":"handle_call","arity":3,"line":40}]}"#,
            ))
            .await;
    });

    assert_eq!(
        result.unwrap().functions[0].display_name(),
        "handle_call/3"
    );
    assert!(matches!(
        client.watch("*"),
        Err(WhatelsError::Unsupported(_))
    ));
}

#[tokio::test]
async fn test_server_disconnect_then_reconnect() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = Client::builder().port(port).build();

    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    let mut server = FakeServer {
        stream: accepted.unwrap().0,
        buffer: FrameBuffer::new(),
    };
    server.push("/a.erl", EMPTY).await;
    while client.get_path_symbols("/a.erl").is_none() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (result, ()) = tokio::join!(client.get_symbols("/b.erl"), async {
        server.next_frame().await;
        drop(server);
    });
    assert!(result.unwrap_err().is_transport_error());

    // Wait for the read loop to notice the hang-up.
    while client.state() == ConnectionState::Connected {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    accepted.unwrap();
    assert!(client.is_connected());
    assert!(client.get_all_path_symbols().is_empty());
}

#[tokio::test]
async fn test_close_then_reconnect_starts_fresh() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut client = Client::builder().port(port).build();

    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    let mut server = FakeServer {
        stream: accepted.unwrap().0,
        buffer: FrameBuffer::new(),
    };

    let mut sub = client.watch_stream("*").unwrap();
    server.next_frame().await;
    server.push("/a.erl", EMPTY).await;
    assert!(sub.recv().await.is_some());
    assert!(client.get_path_symbols("/a.erl").is_some());

    client.close();
    client.close();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(sub.recv().await.is_none());

    // Server sees the socket close.
    let mut rest = Vec::new();
    let _ = server.stream.read_to_end(&mut rest).await;
    assert!(rest.is_empty());

    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    accepted.unwrap();
    assert!(client.is_connected());
    assert!(client.get_path_symbols("/a.erl").is_none());
}

#[tokio::test]
async fn test_connect_refused_allows_retry() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = Client::builder()
        .port(port)
        .connect_timeout(Duration::from_secs(5))
        .build();

    let err = client.connect().await.unwrap_err();
    assert!(err.is_transport_error());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let (connected, accepted) = tokio::join!(client.connect(), listener.accept());
    connected.unwrap();
    accepted.unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_close_with_unread_frame_releases_socket() {
    let (client, mut server) = connected(Dialect::PathSymbols).await;

    // Larger than the kernel socket buffers on both ends combined.
    let wildcard = "x".repeat(32 * 1024 * 1024);
    let frame_len = build_frame("watch!", wildcard.as_bytes()).len();
    client.watch(&wildcard).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    client.close();
    assert_eq!(client.state(), ConnectionState::Closed);

    let mut received = 0;
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match server.stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => received += n,
        }
    }
    assert!(received < frame_len, "{} of {} bytes", received, frame_len);
}
