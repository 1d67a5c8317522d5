//! Integration tests: BlobClient against local endpoints (refused, hung, one-shot responders).

use std::time::Duration;

use arca_transport::{BlobClient, BlobClientConfig, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Nothing listens on the port: upload and download fail as unavailable.
#[tokio::test]
async fn refused_connection_is_unavailable() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    // Bind then drop to get a port nobody is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = BlobClient::new(
        BlobClientConfig::new()
            .endpoint(format!("http://{addr}"))
            .request_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let err = client.upload(b"payload").await.unwrap_err();
    assert!(err.is_unavailable(), "{err}");

    let err = client.download("bafy").await.unwrap_err();
    assert!(err.is_unavailable(), "{err}");
}

/// A server that accepts but never answers trips the request timeout.
#[tokio::test]
async fn hung_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let client = BlobClient::new(
        BlobClientConfig::new()
            .endpoint(format!("http://{addr}"))
            .request_timeout(Duration::from_millis(200)),
    )
    .unwrap();

    let err = client.upload(b"payload").await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }), "{err}");
    server.abort();
}

/// Minimal one-shot HTTP responder: reads the request, writes `body` with `status`.
async fn serve_once(status: &'static str, body: &'static str) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });
    addr
}

/// Read one request: headers, then `content-length` bytes of body.
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let body_len = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + body_len {
            return;
        }
    }
}

#[tokio::test]
async fn upload_reads_cid_field() {
    let addr = serve_once("200 OK", r#"{"cid":"bafyfromserver"}"#).await;
    let client = BlobClient::new(BlobClientConfig::new().endpoint(format!("http://{addr}"))).unwrap();

    let id = client.upload(b"payload").await.unwrap();
    assert_eq!(id, "bafyfromserver");
}

#[tokio::test]
async fn download_without_data_is_protocol_error() {
    let addr = serve_once("200 OK", r#"{"status":"pinned"}"#).await;
    let client = BlobClient::new(BlobClientConfig::new().endpoint(format!("http://{addr}"))).unwrap();

    let err = client.download("bafy").await.unwrap_err();
    assert!(matches!(err, TransportError::Protocol { .. }), "{err}");
}

#[tokio::test]
async fn server_error_status_is_unavailable() {
    let addr = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;
    let client = BlobClient::new(BlobClientConfig::new().endpoint(format!("http://{addr}"))).unwrap();

    let err = client.download("bafy").await.unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 503, .. }), "{err}");
}
