//! End-to-end tests driving a real TCP connection against a running
//! server task, covering the wire protocol scenarios.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tinydb::pager::Pager;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn spawn_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let pager = Arc::new(Pager::in_memory(4096));
    let backend = tinydb::backend::Backend::new(pager);

    tokio::spawn(async move {
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let backend = backend.clone();
            tokio::spawn(async move {
                let conn = tinydb::connection::Connection::new(socket, backend, 1024 * 1024);
                conn.run().await;
            });
        }
    });

    addr
}

fn frame(control: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(control);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.to_vec()
}

fn string_payload(s: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
    buf.to_vec()
}

fn query_payload(sql: &str) -> Vec<u8> {
    string_payload(sql)
}

async fn read_response(stream: &mut TcpStream) -> (u8, BytesMut) {
    let mut tag = [0u8; 1];
    stream.read_exact(&mut tag).await.unwrap();
    match tag[0] {
        b'C' => (tag[0], BytesMut::new()),
        b'E' => {
            let len = stream.read_u32().await.unwrap();
            let mut body = vec![0u8; len as usize];
            stream.read_exact(&mut body).await.unwrap();
            (tag[0], BytesMut::from(&body[..]))
        }
        b'B' | b'D' => {
            let count = stream.read_u32().await.unwrap();
            let mut body = BytesMut::new();
            body.put_u32(count);
            for _ in 0..count {
                let len = stream.read_u32().await.unwrap();
                let mut s = vec![0u8; len as usize];
                stream.read_exact(&mut s).await.unwrap();
                body.put_u32(len);
                body.put_slice(&s);
            }
            (tag[0], body)
        }
        other => panic!("unexpected response tag {other:#04x}"),
    }
}

fn read_strings(mut body: BytesMut) -> Vec<String> {
    let count = body.get_u32();
    (0..count)
        .map(|_| {
            let len = body.get_u32() as usize;
            let s = String::from_utf8(body.split_to(len).to_vec()).unwrap();
            s
        })
        .collect()
}

#[tokio::test]
async fn create_insert_select_round_trip() {
    let addr = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&frame(b'Q', &query_payload("CREATE TABLE foo (name text)")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');

    stream
        .write_all(&frame(b'Q', &query_payload("INSERT INTO foo (name) VALUES ('bar')")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');

    stream
        .write_all(&frame(b'Q', &query_payload("SELECT name FROM foo WHERE name = 'bar'")))
        .await
        .unwrap();
    let (tag, body) = read_response(&mut stream).await;
    assert_eq!(tag, b'B');
    assert_eq!(read_strings(body), vec!["name".to_string()]);

    stream.write_all(&frame(b'N', &[])).await.unwrap();
    let (tag, body) = read_response(&mut stream).await;
    assert_eq!(tag, b'D');
    assert_eq!(read_strings(body), vec!["bar".to_string()]);

    stream.write_all(&frame(b'N', &[])).await.unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');
}

#[tokio::test]
async fn select_from_missing_table_is_an_error_and_connection_stays_open() {
    let addr = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&frame(b'Q', &query_payload("SELECT * FROM missing_table")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'E');

    stream
        .write_all(&frame(b'Q', &query_payload("CREATE TABLE still_alive (a int)")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');
}

#[tokio::test]
async fn malformed_sql_is_an_error_and_connection_stays_open() {
    let addr = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&frame(b'Q', &query_payload("SELEKT * FROM foo")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'E');

    stream
        .write_all(&frame(b'Q', &query_payload("CREATE TABLE t (a int)")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');
}

#[tokio::test]
async fn begin_insert_rollback_insert_is_visible_within_connection() {
    let addr = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&frame(b'Q', &query_payload("CREATE TABLE foo (name text)")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');

    stream.write_all(&frame(b'Q', &query_payload("BEGIN"))).await.unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');

    stream
        .write_all(&frame(b'Q', &query_payload("INSERT INTO foo (name) VALUES ('x')")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');

    stream
        .write_all(&frame(b'Q', &query_payload("ROLLBACK")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'C');

    stream
        .write_all(&frame(b'Q', &query_payload("SELECT name FROM foo")))
        .await
        .unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'B');
    stream.write_all(&frame(b'N', &[])).await.unwrap();
    let (tag, body) = read_response(&mut stream).await;
    assert_eq!(tag, b'D');
    assert_eq!(read_strings(body), vec!["x".to_string()]);
}

#[tokio::test]
async fn next_with_no_active_program_is_a_protocol_error_and_closes_the_connection() {
    let addr = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&frame(b'N', &[])).await.unwrap();
    assert_eq!(read_response(&mut stream).await.0, b'E');

    // the connection is now closed by the server; further writes either
    // fail outright or the next read returns EOF.
    let mut buf = [0u8; 1];
    let result = stream.read(&mut buf).await;
    match result {
        Ok(0) => {}
        Ok(_) => panic!("expected EOF after a protocol error"),
        Err(_) => {}
    }
}

#[tokio::test]
async fn oversized_payload_closes_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let pager = Arc::new(Pager::in_memory(4096));
    let backend = tinydb::backend::Backend::new(pager);

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let conn = tinydb::connection::Connection::new(socket, backend, 8);
        conn.run().await;
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&frame(b'Q', &[0u8; 9])).await.unwrap();

    let mut buf = [0u8; 1];
    let result = stream.read(&mut buf).await;
    assert!(matches!(result, Ok(0)) || result.is_err());
}
