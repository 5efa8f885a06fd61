// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::Connections;
use crate::delay_range::DurationRange;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EgressV1Counts {
    pub firehose: usize,
    pub stream: usize,
    pub recent_log: usize,
    pub container_metric: usize,
}

/// Fans out the configured mix of v1 traffic.
pub struct EgressV1 {
    connections: Arc<dyn Connections>,
    counts: EgressV1Counts,
    async_request_delay: DurationRange,
}

impl EgressV1 {
    pub fn new(
        connections: Arc<dyn Connections>,
        counts: EgressV1Counts,
        async_request_delay: DurationRange,
    ) -> Self {
        EgressV1 {
            connections,
            counts,
            async_request_delay,
        }
    }

    /// Launches every long-lived connection at once and staggers the one-shot requests. Returns
    /// without waiting for any of them; the returned set owns the launcher tasks.
    pub fn start(&self) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        debug!("Starting v1 egress: {:?}", self.counts);

        for _ in 0..self.counts.firehose {
            let connections = Arc::clone(&self.connections);
            tasks.spawn(async move { connections.firehose().await });
        }
        for _ in 0..self.counts.stream {
            let connections = Arc::clone(&self.connections);
            tasks.spawn(async move { connections.stream().await });
        }

        let connections = Arc::clone(&self.connections);
        tasks.spawn(staggered(
            self.counts.recent_log,
            self.async_request_delay,
            move || {
                let connections = Arc::clone(&connections);
                async move { connections.recent_logs().await }
            },
        ));

        let connections = Arc::clone(&self.connections);
        tasks.spawn(staggered(
            self.counts.container_metric,
            self.async_request_delay,
            move || {
                let connections = Arc::clone(&connections);
                async move { connections.container_metrics().await }
            },
        ));

        tasks
    }
}

// Each request runs on its own task so a slow response never delays the next launch.
async fn staggered<F, Fut>(count: usize, delay: DurationRange, request: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    for _ in 0..count {
        let pause = delay.jitter();
        tokio::spawn(request());
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}
