// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::aggregator_service::AggregatorHandle;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::errors::Flush;
use crate::metric::Counter;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::OnceCell;
use tracing::{debug, error};

pub struct FlusherConfig {
    pub aggregator_handle: AggregatorHandle,
    /// Local metrics agent, `127.0.0.1:<metron port>` in production.
    pub target: SocketAddr,
    pub namespace: Option<String>,
}

/// Emits aggregated counters as DogStatsD lines over UDP.
pub struct Flusher {
    aggregator_handle: AggregatorHandle,
    target: SocketAddr,
    namespace: Option<String>,
    socket: OnceCell<UdpSocket>,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            aggregator_handle: config.aggregator_handle,
            target: config.target,
            namespace: config.namespace,
            socket: OnceCell::new(),
        }
    }

    async fn socket(&self) -> Result<&UdpSocket, Flush> {
        self.socket
            .get_or_try_init(|| async { UdpSocket::bind("0.0.0.0:0").await.map_err(Flush::Bind) })
            .await
    }

    /// Drains the aggregator and sends everything it held. Counters that could not be sent are
    /// returned so the caller can retry them on the next tick.
    pub async fn flush(&self) -> Option<Vec<Counter>> {
        let counters = match self.aggregator_handle.flush().await {
            Ok(counters) => counters,
            Err(e) => {
                error!("Failed to flush metrics: {}", Flush::Aggregator(e));
                return None;
            }
        };
        self.flush_counters(counters).await
    }

    pub async fn flush_counters(&self, counters: Vec<Counter>) -> Option<Vec<Counter>> {
        if counters.is_empty() {
            return None;
        }
        debug!("Flushing {} counters to {}", counters.len(), self.target);

        let socket = match self.socket().await {
            Ok(socket) => socket,
            Err(e) => {
                error!("Failed to flush metrics: {e}");
                return Some(counters);
            }
        };

        let mut failed = Vec::new();
        for (datagram, batch) in pack(&counters, self.namespace.as_deref()) {
            if let Err(source) = socket.send_to(datagram.as_bytes(), self.target).await {
                error!(
                    "{}",
                    Flush::Send {
                        addr: self.target,
                        source
                    }
                );
                failed.extend_from_slice(batch);
            }
        }

        if failed.is_empty() {
            None
        } else {
            Some(failed)
        }
    }
}

/// Joins counter lines with '\n' into datagrams no larger than [`MAX_DATAGRAM_SIZE`], returning
/// each datagram alongside the counters it carries. A single line longer than the limit is sent
/// on its own.
fn pack<'a>(counters: &'a [Counter], namespace: Option<&str>) -> Vec<(String, &'a [Counter])> {
    let mut datagrams = Vec::new();
    let mut current = String::new();
    let mut start = 0;

    for (i, counter) in counters.iter().enumerate() {
        let line = counter.to_dogstatsd(namespace);
        if !current.is_empty() && current.len() + 1 + line.len() > MAX_DATAGRAM_SIZE {
            datagrams.push((std::mem::take(&mut current), &counters[start..i]));
            start = i;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        datagrams.push((current, &counters[start..]));
    }
    datagrams
}
