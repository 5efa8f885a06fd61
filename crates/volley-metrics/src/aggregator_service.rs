// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::aggregator::Aggregator;
use crate::metric::{Counter, SortedTags};
use crate::sink::MetricSink;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

#[derive(Debug)]
pub enum AggregatorCommand {
    Insert(Counter),
    Flush(oneshot::Sender<Vec<Counter>>),
    Shutdown,
}

/// Cheap-to-clone handle to a running [`AggregatorService`]. Doubles as the process-wide
/// [`MetricSink`].
#[derive(Clone, Debug)]
pub struct AggregatorHandle {
    tx: mpsc::UnboundedSender<AggregatorCommand>,
}

impl AggregatorHandle {
    pub async fn flush(&self) -> Result<Vec<Counter>, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(AggregatorCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {}", e))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<AggregatorCommand>> {
        self.tx.send(AggregatorCommand::Shutdown)
    }
}

impl MetricSink for AggregatorHandle {
    fn add_counter(&self, name: &str, tags: SortedTags, delta: u64) {
        if self
            .tx
            .send(AggregatorCommand::Insert(Counter::new(name, tags, delta)))
            .is_err()
        {
            debug!("Aggregator service stopped, dropping counter {name}");
        }
    }
}

pub struct AggregatorService {
    aggregator: Aggregator,
    rx: mpsc::UnboundedReceiver<AggregatorCommand>,
}

impl AggregatorService {
    pub fn new(
        tags: SortedTags,
        max_context: usize,
    ) -> Result<(Self, AggregatorHandle), crate::errors::Creation> {
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = Aggregator::new(tags, max_context)?;

        let service = Self { aggregator, rx };

        let handle = AggregatorHandle { tx };

        Ok((service, handle))
    }

    pub async fn run(mut self) {
        debug!("Aggregator service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                AggregatorCommand::Insert(counter) => {
                    if let Err(e) = self.aggregator.insert(counter) {
                        warn!("Failed to insert counter: {e}");
                    }
                }

                AggregatorCommand::Flush(response_tx) => {
                    let counters = self.aggregator.consume_counters();
                    if response_tx.send(counters).is_err() {
                        error!("Failed to send flush response - receiver dropped");
                    }
                }

                AggregatorCommand::Shutdown => {
                    debug!("Aggregator service shutting down");
                    break;
                }
            }
        }

        debug!("Aggregator service stopped");
    }
}
