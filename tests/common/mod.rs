//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use vproxy::config::{DaemonSettings, Setting, Source};
use vproxy::lifecycle::assemble;
use vproxy::ProxyServer;

/// Start a backend that answers every request with the request head it
/// received as the body. Returns its address.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            buf.extend_from_slice(&chunk[..n]);
                            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let head = String::from_utf8_lossy(&buf).into_owned();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    head.len(),
                    head
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// A port nothing listens on.
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// HTTP-only daemon settings for a binding spec.
pub fn http_settings(bind: &str) -> DaemonSettings {
    DaemonSettings {
        listen: Setting::new("127.0.0.1".to_string(), Source::Default),
        http: Setting::new(80, Source::Default),
        https: Setting::new(0, Source::Explicit),
        bind: Setting::new(bind.to_string(), Source::Explicit),
    }
}

/// Serve the proxy's HTTP listener on an ephemeral port.
pub async fn start_proxy(bind: &str) -> SocketAddr {
    let server = Arc::new(assemble(&http_settings(bind), None).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(serve(server, listener));
    addr
}

async fn serve(server: Arc<ProxyServer>, listener: TcpListener) {
    let _ = server.serve_http(listener).await;
}

/// reqwest client that bypasses any system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
