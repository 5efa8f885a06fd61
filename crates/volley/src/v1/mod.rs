// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! First-generation egress: websocket firehose and stream connections plus one-shot HTTP
//! requests against traffic controllers.

use async_trait::async_trait;

pub mod connection_manager;
pub mod egress;

pub use connection_manager::{ConnectionManager, ConnectionSettings};
pub use egress::{EgressV1, EgressV1Counts};

/// The four kinds of v1 traffic. Each call drives one connection or request to completion.
#[async_trait]
pub trait Connections: Send + Sync {
    async fn firehose(&self);
    async fn stream(&self);
    async fn recent_logs(&self);
    async fn container_metrics(&self);
}
