// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::Connections;
use crate::constants::{
    CLOSED_CONNECTIONS, CONN_TYPE, CONTAINER_METRICS, FIREHOSE, NUMBER_OF_REQUESTS,
    NUMBER_OF_REQUEST_ERRORS, OPEN_CONNECTIONS, RECEIVED_BATCH_SIZE, RECEIVED_ENVELOPES,
    RECENT_LOGS, STREAM,
};
use crate::delay_range::DurationRange;
use crate::envelope::Envelope;
use crate::errors::TransportError;
use crate::id_store::IdStore;
use crate::transport::{Consumer, Subscription, TrafficControllerConsumer};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use volley_metrics::sink::{BatchCounterExt, MetricSink};

#[derive(Clone, Debug, Default)]
pub struct ConnectionSettings {
    pub auth_token: String,
    pub subscription_id: String,
    /// Delay drawn after every received envelope. Zero-width disables throttling.
    pub receive_delay: DurationRange,
}

/// Opens v1 firehose and stream connections and one-shot requests against a pool of traffic
/// controllers, feeding observed source identifiers back into the id store.
pub struct ConnectionManager {
    consumers: Vec<Arc<dyn Consumer>>,
    rng: Mutex<StdRng>,
    settings: ConnectionSettings,
    id_store: Arc<dyn IdStore>,
    sink: Arc<dyn MetricSink>,
}

impl ConnectionManager {
    pub fn new(
        consumers: Vec<Arc<dyn Consumer>>,
        settings: ConnectionSettings,
        id_store: Arc<dyn IdStore>,
        sink: Arc<dyn MetricSink>,
    ) -> Result<Self, TransportError> {
        if consumers.is_empty() {
            return Err(TransportError::NoEndpoints);
        }
        Ok(ConnectionManager {
            consumers,
            rng: Mutex::new(StdRng::from_os_rng()),
            settings,
            id_store,
            sink,
        })
    }

    /// Builds a manager with one websocket consumer per traffic controller address.
    pub fn from_addrs(
        addrs: &[String],
        settings: ConnectionSettings,
        id_store: Arc<dyn IdStore>,
        sink: Arc<dyn MetricSink>,
    ) -> Result<Self, TransportError> {
        let consumers = addrs
            .iter()
            .map(|addr| {
                TrafficControllerConsumer::new(addr).map(|c| Arc::new(c) as Arc<dyn Consumer>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(consumers, settings, id_store, sink)
    }

    fn pick(&self) -> &Arc<dyn Consumer> {
        let index = match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..self.consumers.len()),
            Err(poisoned) => poisoned.into_inner().random_range(0..self.consumers.len()),
        };
        &self.consumers[index]
    }

    async fn follow(&self, subscription: Subscription, conn_type: &'static str, target: &str) {
        self.sink
            .batch_counter(OPEN_CONNECTIONS)
            .with_tag(CONN_TYPE, conn_type)
            .increment();

        let Subscription {
            envelopes,
            mut errors,
        } = subscription;
        tokio::spawn(consume(
            envelopes,
            conn_type,
            self.settings.receive_delay,
            Arc::clone(&self.id_store),
            Arc::clone(&self.sink),
        ));

        let reason = errors.recv().await;
        self.sink
            .batch_counter(CLOSED_CONNECTIONS)
            .with_tag(CONN_TYPE, conn_type)
            .increment();
        match reason {
            Some(e) => warn!("Error from {target} ({conn_type}): {e}"),
            None => debug!("Connection for {target} ({conn_type}) closed"),
        }
    }

    fn record_request(
        &self,
        conn_type: &'static str,
        source_id: &str,
        result: Result<Vec<Envelope>, TransportError>,
    ) {
        match result {
            Ok(_) => self
                .sink
                .batch_counter(NUMBER_OF_REQUESTS)
                .with_tag(CONN_TYPE, conn_type)
                .increment(),
            Err(e) => {
                self.sink
                    .batch_counter(NUMBER_OF_REQUEST_ERRORS)
                    .with_tag(CONN_TYPE, conn_type)
                    .increment();
                warn!("Error from {source_id} ({conn_type}): {e}");
            }
        }
    }

    /// Closes every pooled consumer. Running loops notice the closed streams and exit.
    pub fn close(&self) {
        for consumer in &self.consumers {
            consumer.close();
        }
    }
}

#[async_trait]
impl Connections for ConnectionManager {
    async fn firehose(&self) {
        let consumer = self.pick();
        let subscription_id = &self.settings.subscription_id;
        match consumer
            .firehose(subscription_id, &self.settings.auth_token)
            .await
        {
            Ok(subscription) => self.follow(subscription, FIREHOSE, subscription_id).await,
            Err(e) => warn!("Failed to open firehose {subscription_id}: {e}"),
        }
    }

    async fn stream(&self) {
        let consumer = self.pick();
        let source_id = self.id_store.get().await;
        match consumer.stream(&source_id, &self.settings.auth_token).await {
            Ok(subscription) => self.follow(subscription, STREAM, &source_id).await,
            Err(e) => warn!("Failed to open stream for {source_id}: {e}"),
        }
    }

    async fn recent_logs(&self) {
        let consumer = self.pick();
        let source_id = self.id_store.get().await;
        let result = consumer
            .recent_logs(&source_id, &self.settings.auth_token)
            .await;
        self.record_request(RECENT_LOGS, &source_id, result);
    }

    async fn container_metrics(&self) {
        let consumer = self.pick();
        let source_id = self.id_store.get().await;
        let result = consumer
            .container_metrics(&source_id, &self.settings.auth_token)
            .await;
        self.record_request(CONTAINER_METRICS, &source_id, result);
    }
}

/// Drains `envelopes` until the connection ends, reporting received counts in batches and
/// recording every sampling candidate.
pub(crate) async fn consume(
    mut envelopes: mpsc::Receiver<Envelope>,
    conn_type: &'static str,
    receive_delay: DurationRange,
    id_store: Arc<dyn IdStore>,
    sink: Arc<dyn MetricSink>,
) {
    let mut count: u64 = 0;
    while let Some(envelope) = envelopes.recv().await {
        count += 1;
        if count % RECEIVED_BATCH_SIZE == 0 {
            sink.batch_counter(RECEIVED_ENVELOPES)
                .with_tag(CONN_TYPE, conn_type)
                .add(RECEIVED_BATCH_SIZE);
        }

        if let Some(source_id) = envelope.sampling_candidate() {
            id_store.add(source_id);
        }

        if !receive_delay.is_zero_width() {
            tokio::time::sleep(receive_delay.jitter()).await;
        }
    }
}
