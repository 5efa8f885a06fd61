// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while building an aggregator.
#[derive(Debug, thiserror::Error)]
pub enum Creation {
    #[error("max contexts must be greater than zero")]
    Contexts,
}

/// Errors raised when a counter cannot be recorded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Insert {
    #[error("context limit of {0} reached")]
    Overflow(usize),
}

/// Errors raised while shipping a flush to the metric endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Flush {
    #[error("failed to bind emitter socket: {0}")]
    Bind(std::io::Error),

    #[error("failed to send datagram to {addr}: {source}")]
    Send {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("aggregator unavailable: {0}")]
    Aggregator(String),
}
