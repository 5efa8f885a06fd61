// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use volley::envelope::Envelope;

/// JSON text frames of log envelopes, one per source identifier.
pub fn log_frames(ids: &[&str]) -> Vec<String> {
    ids.iter()
        .map(|id| serde_json::to_string(&Envelope::log(id)).expect("Failed to encode envelope"))
        .collect()
}

/// Send a GET over TCP and return the status and body
pub async fn get(
    addr: SocketAddr,
    uri: &str,
) -> Result<(u16, Vec<u8>), Box<dyn std::error::Error>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(addr),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri(uri)
        .method("GET")
        .header("Host", addr.to_string())
        .body(Empty::<Bytes>::new())?;
    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;
    let status = response.status().as_u16();
    let body = response.into_body().collect().await?.to_bytes().to_vec();

    Ok((status, body))
}
