// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{Consumer, Subscription};
use crate::envelope::{Envelope, EnvelopeDecoder, JsonDecoder};
use crate::errors::TransportError;
use crate::tls::insecure_client_config;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message as WsMessage},
    Connector, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const ENVELOPE_BUFFER: usize = 128;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// v1 consumer for a single traffic controller. Streaming endpoints are websockets, one-shot
/// endpoints are plain HTTP on the same host. Server certificates are never verified on either.
pub struct TrafficControllerConsumer {
    ws_base: String,
    http_base: String,
    decoder: Arc<dyn EnvelopeDecoder>,
    http: reqwest::Client,
    tls: Arc<rustls::ClientConfig>,
    cancel: CancellationToken,
}

impl TrafficControllerConsumer {
    pub fn new(addr: &str) -> Result<Self, TransportError> {
        Self::with_decoder(addr, Arc::new(JsonDecoder))
    }

    pub fn with_decoder(
        addr: &str,
        decoder: Arc<dyn EnvelopeDecoder>,
    ) -> Result<Self, TransportError> {
        let (ws_base, http_base) = bases(addr)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(TrafficControllerConsumer {
            ws_base,
            http_base,
            decoder,
            http,
            tls: Arc::new(insecure_client_config()?),
            cancel: CancellationToken::new(),
        })
    }

    async fn subscribe(&self, path: &str, token: &str) -> Result<Subscription, TransportError> {
        let url = format!("{}{}", self.ws_base, path);
        let mut request = url.as_str().into_client_request()?;
        if !token.is_empty() {
            let value = HeaderValue::from_str(token)
                .map_err(|_| TransportError::Endpoint(url.clone()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let connector = Connector::Rustls(Arc::clone(&self.tls));
        let (ws, _) = connect_async_tls_with_config(request, None, false, Some(connector)).await?;
        debug!("Connected to {url}");

        let (envelopes_tx, envelopes) = mpsc::channel(ENVELOPE_BUFFER);
        let (errors_tx, errors) = mpsc::channel(1);
        tokio::spawn(read_frames(
            ws,
            Arc::clone(&self.decoder),
            envelopes_tx,
            errors_tx,
            self.cancel.child_token(),
        ));

        Ok(Subscription { envelopes, errors })
    }

    async fn request(&self, path: &str, token: &str) -> Result<Vec<Envelope>, TransportError> {
        let mut request = self.http.get(format!("{}{}", self.http_base, path));
        if !token.is_empty() {
            request = request.header(AUTHORIZATION, token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Consumer for TrafficControllerConsumer {
    async fn firehose(
        &self,
        subscription_id: &str,
        token: &str,
    ) -> Result<Subscription, TransportError> {
        self.subscribe(&format!("/firehose/{subscription_id}"), token)
            .await
    }

    async fn stream(&self, source_id: &str, token: &str) -> Result<Subscription, TransportError> {
        self.subscribe(&format!("/apps/{source_id}/stream"), token)
            .await
    }

    async fn recent_logs(
        &self,
        source_id: &str,
        token: &str,
    ) -> Result<Vec<Envelope>, TransportError> {
        self.request(&format!("/apps/{source_id}/recentlogs"), token)
            .await
    }

    async fn container_metrics(
        &self,
        source_id: &str,
        token: &str,
    ) -> Result<Vec<Envelope>, TransportError> {
        self.request(&format!("/apps/{source_id}/containermetrics"), token)
            .await
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

async fn read_frames(
    mut ws: WsStream,
    decoder: Arc<dyn EnvelopeDecoder>,
    envelopes: mpsc::Sender<Envelope>,
    errors: mpsc::Sender<TransportError>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }
            frame = ws.next() => frame,
        };

        let payload = match frame {
            Some(Ok(WsMessage::Binary(data))) => data,
            Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
            Some(Ok(WsMessage::Close(_))) | None => {
                let _ = errors.send(TransportError::Closed).await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                let _ = errors.send(e.into()).await;
                return;
            }
        };

        let envelope = match decoder.decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Dropping undecodable frame: {e}");
                continue;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }
            sent = envelopes.send(envelope) => {
                if sent.is_err() {
                    // Nobody is reading any more.
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    }
}

/// Maps a configured address onto its websocket and HTTP base URLs, without a trailing slash.
fn bases(addr: &str) -> Result<(String, String), TransportError> {
    let addr = addr.trim().trim_end_matches('/');
    let (scheme, rest) = addr
        .split_once("://")
        .ok_or_else(|| TransportError::Endpoint(addr.to_string()))?;
    let (ws, http) = match scheme {
        "ws" | "http" => ("ws", "http"),
        "wss" | "https" => ("wss", "https"),
        _ => return Err(TransportError::Endpoint(addr.to_string())),
    };
    if rest.is_empty() {
        return Err(TransportError::Endpoint(addr.to_string()));
    }
    Ok((format!("{ws}://{rest}"), format!("{http}://{rest}")))
}
