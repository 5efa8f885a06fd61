// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Clients for the two egress protocol generations.

use crate::envelope::{Envelope, EnvelopeV2, Selector};
use crate::errors::TransportError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

pub mod gateway;
pub mod websocket;

pub use gateway::GatewayClient;
pub use websocket::TrafficControllerConsumer;

/// A live v1 connection. `envelopes` closes when the connection ends; `errors` yields the reason
/// at most once before closing.
#[derive(Debug)]
pub struct Subscription {
    pub envelopes: mpsc::Receiver<Envelope>,
    pub errors: mpsc::Receiver<TransportError>,
}

/// One v1 traffic controller.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn firehose(
        &self,
        subscription_id: &str,
        token: &str,
    ) -> Result<Subscription, TransportError>;

    async fn stream(&self, source_id: &str, token: &str) -> Result<Subscription, TransportError>;

    async fn recent_logs(&self, source_id: &str, token: &str)
        -> Result<Vec<Envelope>, TransportError>;

    async fn container_metrics(
        &self,
        source_id: &str,
        token: &str,
    ) -> Result<Vec<Envelope>, TransportError>;

    /// Tears down every connection opened through this consumer.
    fn close(&self);
}

pub type EnvelopeStream = BoxStream<'static, Result<EnvelopeV2, TransportError>>;

/// Opens v2 receive streams.
#[async_trait]
pub trait EgressClient: Send + Sync {
    async fn receiver(&self, addr: &str, selector: &Selector)
        -> Result<EnvelopeStream, TransportError>;
}
