// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors raised while reading the process configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors raised when parsing a duration or a duration range.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid duration range {0:?}, expected {{min}}-{{max}}")]
    Format(String),

    #[error("range max {max:?} is smaller than min {min:?}")]
    Inverted { min: Duration, max: Duration },
}

/// Errors raised when building a [`crate::delay_range::DelayRange`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DelayRangeError {
    #[error("delay range [{min:?}, {max:?}) must span at least 2ns")]
    TooNarrow { min: Duration, max: Duration },
}

/// Errors raised by the egress transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("invalid endpoint {0:?}")]
    Endpoint(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("failed to decode envelope: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed by remote")]
    Closed,

    #[error("event stream line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("tls setup failed: {0}")]
    Tls(#[from] TlsError),
}

/// Errors raised while loading TLS material.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Pem {
        path: String,
        source: rustls::pki_types::pem::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("invalid server name {0:?}")]
    ServerName(String),

    #[error("certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Errors that stop the provisioning server.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised when writing to the drain registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no registry endpoints configured")]
    NoEndpoints,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry rejected write with status {0}")]
    Status(u16),
}
