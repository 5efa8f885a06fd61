// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spies, a mock traffic controller and a mock v2 gateway

use futures_util::SinkExt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use volley_metrics::metric::SortedTags;
use volley_metrics::sink::MetricSink;

/// Metric sink that keeps every emitted counter.
#[derive(Default)]
pub struct RecordingSink {
    counters: Mutex<Vec<(String, SortedTags, u64)>>,
}

impl RecordingSink {
    pub fn total(&self, name: &str, tag: (&str, &str)) -> u64 {
        self.counters
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|(n, tags, _)| n == name && tags.get(tag.0) == Some(tag.1))
            .map(|(_, _, delta)| delta)
            .sum()
    }
}

impl MetricSink for RecordingSink {
    fn add_counter(&self, name: &str, tags: SortedTags, delta: u64) {
        self.counters
            .lock()
            .expect("lock poisoned")
            .push((name.to_string(), tags, delta));
    }
}

#[derive(Clone, Debug)]
pub struct Handshake {
    pub path: String,
    pub authorization: Option<String>,
}

/// Websocket server that replays `frames` to every client, then closes the connection.
#[derive(Clone)]
pub struct MockTrafficController {
    pub addr: SocketAddr,
    pub handshakes: Arc<Mutex<Vec<Handshake>>>,
    tls: bool,
}

impl MockTrafficController {
    pub async fn start(frames: Vec<String>) -> Self {
        Self::spawn(frames, None).await
    }

    /// Same as [`MockTrafficController::start`], behind TLS with `config`.
    pub async fn start_tls(frames: Vec<String>, config: rustls::ServerConfig) -> Self {
        Self::spawn(frames, Some(TlsAcceptor::from(Arc::new(config)))).await
    }

    async fn spawn(frames: Vec<String>, tls: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock traffic controller");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let handshakes_clone = handshakes.clone();
        let is_tls = tls.is_some();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let handshakes = handshakes_clone.clone();
                let frames = frames.clone();
                let tls = tls.clone();

                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => {
                            if let Ok(stream) = acceptor.accept(stream).await {
                                replay(stream, frames, handshakes).await;
                            }
                        }
                        None => replay(stream, frames, handshakes).await,
                    }
                });
            }
        });

        Self {
            addr,
            handshakes,
            tls: is_tls,
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}", self.addr)
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.handshakes.lock().expect("lock poisoned").clone()
    }
}

async fn replay<S>(stream: S, frames: Vec<String>, handshakes: Arc<Mutex<Vec<Handshake>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        handshakes.lock().expect("lock poisoned").push(Handshake {
            path: req.uri().path().to_string(),
            authorization: req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
        Ok(resp)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    for frame in frames {
        if ws.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
    let _ = ws.close(None).await;
}

/// Bare HTTP/1.1 server answering every request with the same complete event stream body, and
/// keeping connections open for reuse.
pub struct MockGateway {
    pub addr: SocketAddr,
    served: Arc<Mutex<Vec<usize>>>,
    tls: bool,
}

impl MockGateway {
    pub async fn start(body: &'static str) -> Self {
        Self::spawn(body, None).await
    }

    pub async fn start_tls(body: &'static str, config: rustls::ServerConfig) -> Self {
        Self::spawn(body, Some(TlsAcceptor::from(Arc::new(config)))).await
    }

    async fn spawn(body: &'static str, tls: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock gateway");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let served = Arc::new(Mutex::new(Vec::new()));
        let served_clone = served.clone();
        let is_tls = tls.is_some();

        tokio::spawn(async move {
            for connection in 0usize.. {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let served = served_clone.clone();
                let tls = tls.clone();

                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => {
                            if let Ok(stream) = acceptor.accept(stream).await {
                                answer(stream, connection, body, served).await;
                            }
                        }
                        None => answer(stream, connection, body, served).await,
                    }
                });
            }
        });

        Self {
            addr,
            served,
            tls: is_tls,
        }
    }

    pub fn url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}", self.addr)
    }

    /// Index of the accepted connection each request arrived on, in arrival order.
    pub fn served(&self) -> Vec<usize> {
        self.served.lock().expect("lock poisoned").clone()
    }
}

async fn answer<S>(stream: S, connection: usize, body: &str, served: Arc<Mutex<Vec<usize>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    loop {
        // Request line and headers, up to the blank line. Requests carry no body.
        let mut head_lines = 0;
        loop {
            line.clear();
            match stream.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) if line == "\r\n" => break,
                Ok(_) => head_lines += 1,
            }
        }
        if head_lines == 0 {
            continue;
        }
        served.lock().expect("lock poisoned").push(connection);

        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        );
        let writer = stream.get_mut();
        if writer.write_all(response.as_bytes()).await.is_err() || writer.flush().await.is_err() {
            return;
        }
    }
}
