//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use print_proxy::config::{Mode, ProxyConfig, RateLimitConfig};
use print_proxy::lifecycle::{start_with, RunningProxy};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const ALLOWED_ORIGIN: &str = "https://app.example";

/// A raw-TCP print server stand-in that counts and records requests.
pub struct MockPrintServer {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockPrintServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Raw request heads (request line and headers) plus body, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a mock print server. `respond` maps the raw request to
/// `(status, body)`; bodies are sent as JSON.
pub async fn start_mock_print_server<F>(respond: F) -> MockPrintServer
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let (c, r) = (calls.clone(), requests.clone());
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let (c, r, respond) = (c.clone(), r.clone(), respond.clone());
            tokio::spawn(async move {
                serve_connection(socket, c, r, respond).await;
            });
        }
    });

    MockPrintServer { addr, calls, requests }
}

/// A print server that answers `/health` with 200 and echoes everything else.
pub async fn start_healthy_print_server() -> MockPrintServer {
    start_mock_print_server(|raw| {
        let line = raw.lines().next().unwrap_or_default();
        if line.starts_with("GET /health ") {
            (200, r#"{"status":"ok","printers":2}"#.to_string())
        } else {
            (200, format!(r#"{{"echo":"{}"}}"#, line))
        }
    })
    .await
}

async fn serve_connection<F>(
    mut socket: TcpStream,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    respond: Arc<F>,
) where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let Some(raw) = read_request(&mut socket).await else {
        return;
    };
    calls.fetch_add(1, Ordering::SeqCst);
    requests.lock().unwrap().push(raw.clone());

    let (status, body) = respond(&raw);
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: https://upstream.example\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read one request head and its Content-Length body.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(String::from_utf8_lossy(&buf).to_string())
}

/// An address nothing listens on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

pub fn proxy_config(target: &str, max_requests: u32) -> ProxyConfig {
    ProxyConfig {
        bind_host: "127.0.0.1".into(),
        http_port: 0,
        https_port: 0,
        target_url: target.parse().unwrap(),
        allowed_origins: vec![ALLOWED_ORIGIN.into()],
        rate_limit: RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests,
        },
        mode: Mode::Development,
        ..ProxyConfig::default()
    }
}

/// Start an HTTP-only proxy in front of `target`.
pub async fn start_proxy(target: &str, max_requests: u32) -> (RunningProxy, String) {
    let proxy = start_with(Arc::new(proxy_config(target, max_requests)), None)
        .await
        .unwrap();
    let base = format!("http://{}", proxy.http_addr());
    (proxy, base)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
