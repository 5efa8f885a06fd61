// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::Assaulter;
use crate::constants::{
    RECEIVED_BATCH_SIZE, RECEIVED_ENVELOPES, STREAM_LIFETIME, STREAM_LIFETIME_JITTER, V2, VERSION,
};
use crate::delay_range::DurationRange;
use crate::envelope::Selector;
use crate::errors::TransportError;
use crate::transport::{EgressClient, EnvelopeStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use volley_metrics::sink::{BatchCounterExt, MetricSink};

/// What to do between two consecutive receive streams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect straight away, forever.
    #[default]
    Immediate,
    /// Wait `base * 2^(failures - 1)`, capped at `max`, after a failed stream. A stream that ends
    /// cleanly resets the failure count.
    ExponentialBackoff { base: Duration, max: Duration },
}

impl ReconnectPolicy {
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        match *self {
            ReconnectPolicy::Immediate => Duration::ZERO,
            ReconnectPolicy::ExponentialBackoff { base, max } => {
                if consecutive_failures == 0 {
                    return Duration::ZERO;
                }
                let factor = 1u32 << (consecutive_failures - 1).min(31);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Maximum life of a single receive stream: `base` plus up to `jitter`, drawn per stream with
/// millisecond granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamLifetime {
    pub base: Duration,
    pub jitter: Duration,
}

impl Default for StreamLifetime {
    fn default() -> Self {
        StreamLifetime {
            base: STREAM_LIFETIME,
            jitter: STREAM_LIFETIME_JITTER,
        }
    }
}

impl StreamLifetime {
    pub fn draw(&self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.base;
        }
        self.base + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }
}

/// Churns v2 receive streams against a pool of gateways.
pub struct ConnectionManager {
    addrs: Vec<String>,
    receive_delay: DurationRange,
    sink: Arc<dyn MetricSink>,
    client: Arc<dyn EgressClient>,
    reconnect: ReconnectPolicy,
    lifetime: StreamLifetime,
}

impl ConnectionManager {
    pub fn new(
        addrs: Vec<String>,
        receive_delay: DurationRange,
        sink: Arc<dyn MetricSink>,
        client: Arc<dyn EgressClient>,
    ) -> Result<Self, TransportError> {
        if addrs.is_empty() {
            return Err(TransportError::NoEndpoints);
        }
        Ok(ConnectionManager {
            addrs,
            receive_delay,
            sink,
            client,
            reconnect: ReconnectPolicy::default(),
            lifetime: StreamLifetime::default(),
        })
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_stream_lifetime(mut self, lifetime: StreamLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    fn pick(&self) -> &str {
        let index = rand::rng().random_range(0..self.addrs.len());
        &self.addrs[index]
    }

    /// Opens one receive stream and reads it until it ends or outlives its lifetime.
    async fn establish(&self, selector: &Selector) -> Result<(), TransportError> {
        let addr = self.pick();
        let lifetime = self.lifetime.draw();

        let session = async {
            let stream = self.client.receiver(addr, selector).await?;
            self.read(stream).await
        };
        match timeout(lifetime, session).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Stream from {addr} reached its {lifetime:?} lifetime");
                Ok(())
            }
        }
    }

    async fn read(&self, mut stream: EnvelopeStream) -> Result<(), TransportError> {
        let mut count: u64 = 0;
        while let Some(envelope) = stream.next().await {
            envelope?;
            count += 1;
            if count % RECEIVED_BATCH_SIZE == 0 {
                self.sink
                    .batch_counter(RECEIVED_ENVELOPES)
                    .with_tag(VERSION, V2)
                    .add(RECEIVED_BATCH_SIZE);
            }
            if !self.receive_delay.is_zero_width() {
                sleep(self.receive_delay.jitter()).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Assaulter for ConnectionManager {
    async fn assault(&self, selector: Selector) {
        let mut failures: u32 = 0;
        loop {
            match self.establish(&selector).await {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!("v2 stream for {selector:?} failed: {e}");
                }
            }
            let pause = self.reconnect.delay(failures);
            if pause.is_zero() {
                // A peer that refuses or closes instantly must not starve the worker.
                tokio::task::yield_now().await;
            } else {
                sleep(pause).await;
            }
        }
    }
}
