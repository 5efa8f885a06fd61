// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{EgressClient, EnvelopeStream};
use crate::envelope::{EnvelopeBatch, EnvelopeV2, Selector};
use crate::errors::TransportError;
use crate::tls::MutualTls;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::collections::VecDeque;
use tracing::debug;

const READ_PATH: &str = "/v2/read";
const HEARTBEAT_EVENT: &str = "heartbeat";
const PREFERRED_TAGS_PARAM: &str = "use_preferred_tags";

/// Longest unterminated line the event stream parser holds on to.
pub(crate) const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// v2 client reading server-sent event streams from the reverse log proxy gateway.
///
/// Idle connections are never pooled: every receiver dials its own connection and drops it when
/// the stream ends.
#[derive(Clone, Debug)]
pub struct GatewayClient {
    http: reqwest::Client,
    use_preferred_tags: bool,
}

impl GatewayClient {
    /// Builds a client, presenting `tls` as its identity on `https` gateways when given.
    pub fn new(tls: Option<&MutualTls>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .http1_only()
            .pool_max_idle_per_host(0);
        if let Some(tls) = tls {
            builder = builder.use_preconfigured_tls(tls.client_config()?);
        }
        Ok(GatewayClient {
            http: builder.build()?,
            use_preferred_tags: false,
        })
    }

    #[must_use]
    pub fn with_preferred_tags(mut self, use_preferred_tags: bool) -> Self {
        self.use_preferred_tags = use_preferred_tags;
        self
    }

    fn query(&self, selector: &Selector) -> Vec<(&'static str, String)> {
        let mut query = selector.query();
        if self.use_preferred_tags {
            query.push((PREFERRED_TAGS_PARAM, "true".to_string()));
        }
        query
    }
}

#[async_trait]
impl EgressClient for GatewayClient {
    async fn receiver(
        &self,
        addr: &str,
        selector: &Selector,
    ) -> Result<EnvelopeStream, TransportError> {
        let url = format!("{}{}", addr.trim_end_matches('/'), READ_PATH);
        let response = self
            .http
            .get(&url)
            .query(&self.query(selector))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        debug!("Opened v2 stream from {url}");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(envelopes(body))
    }
}

struct ReadState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    parser: SseParser,
    pending: VecDeque<EnvelopeV2>,
    done: bool,
}

fn envelopes(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> EnvelopeStream {
    let state = ReadState {
        body,
        parser: SseParser::default(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(envelope) = state.pending.pop_front() {
                return Some((Ok(envelope), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = match state.parser.push(&chunk) {
                        Ok(events) => events,
                        Err(e) => {
                            state.done = true;
                            return Some((Err(e), state));
                        }
                    };
                    for event in events {
                        if event.event.as_deref() == Some(HEARTBEAT_EVENT) {
                            continue;
                        }
                        match serde_json::from_str::<EnvelopeBatch>(&event.data) {
                            Ok(batch) => state.pending.extend(batch.batch),
                            Err(e) => {
                                state.done = true;
                                return Some((Err(e.into()), state));
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser. Feed it chunks in arrival order, it returns the events
/// completed by each chunk.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    /// Start of the current, unterminated line onwards.
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, TransportError> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut scan_from = self.scanned;
        while let Some(offset) = buffer[scan_from..].iter().position(|b| *b == b'\n') {
            let end = scan_from + offset;
            if let Some(event) = self.line(&buffer[start..end]) {
                events.push(event);
            }
            start = end + 1;
            scan_from = start;
        }

        buffer.drain(..start);
        if buffer.len() > MAX_LINE_BYTES {
            self.scanned = 0;
            return Err(TransportError::LineTooLong(MAX_LINE_BYTES));
        }
        self.scanned = buffer.len();
        self.buffer = buffer;
        Ok(events)
    }

    fn line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');

        if line.is_empty() {
            let event = self.event.take();
            if self.data.is_empty() {
                return None;
            }
            let data = self.data.join("\n");
            self.data.clear();
            return Some(SseEvent { event, data });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}
