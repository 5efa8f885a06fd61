// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::SYSTEM_SOURCE_ID;
use crate::errors::TransportError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRef {
    #[serde(default)]
    pub application_id: Option<String>,
}

/// Event envelope delivered by the traffic controller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message: Option<LogMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_metric: Option<ApplicationRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_start_stop: Option<ApplicationRef>,
}

impl Envelope {
    pub fn log(app_id: &str) -> Self {
        Envelope {
            origin: "volley".to_string(),
            event_type: "LogMessage".to_string(),
            log_message: Some(LogMessage {
                app_id: Some(app_id.to_string()),
                message: None,
            }),
            ..Default::default()
        }
    }

    /// The identifier of the application this envelope belongs to, if any.
    pub fn source_id(&self) -> Option<&str> {
        let from_log = self
            .log_message
            .as_ref()
            .and_then(|log| log.app_id.as_deref());
        let from_metric = self
            .container_metric
            .as_ref()
            .and_then(|m| m.application_id.as_deref());
        let from_http = self
            .http_start_stop
            .as_ref()
            .and_then(|h| h.application_id.as_deref());
        from_log.or(from_metric).or(from_http)
    }

    /// Like [`Envelope::source_id`], but only for identifiers worth sampling: non-empty and not
    /// platform-internal.
    pub fn sampling_candidate(&self) -> Option<&str> {
        self.source_id()
            .filter(|id| !id.is_empty() && *id != SYSTEM_SOURCE_ID)
    }
}

/// Turns raw frames from the wire into [`Envelope`]s.
pub trait EnvelopeDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Envelope, TransportError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDecoder;

impl EnvelopeDecoder for JsonDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Envelope, TransportError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Envelope kinds a v2 stream can be narrowed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageSelector {
    Log,
}

/// Server-side filter for a v2 receive stream. The default selects every envelope from every
/// source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    pub source_id: Option<String>,
    pub message: Option<MessageSelector>,
}

impl Selector {
    pub fn firehose() -> Self {
        Selector::default()
    }

    pub fn source(source_id: impl Into<String>) -> Self {
        Selector {
            source_id: Some(source_id.into()),
            message: None,
        }
    }

    pub fn source_logs(source_id: impl Into<String>) -> Self {
        Selector {
            source_id: Some(source_id.into()),
            message: Some(MessageSelector::Log),
        }
    }

    /// Query parameters understood by the gateway's read endpoint.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(6);
        if let Some(source_id) = &self.source_id {
            query.push(("source_id", source_id.clone()));
        }
        match self.message {
            Some(MessageSelector::Log) => query.push(("log", String::new())),
            None => {
                for kind in ["log", "counter", "gauge", "timer", "event"] {
                    query.push((kind, String::new()));
                }
            }
        }
        query
    }
}

/// Envelope as delivered by the v2 gateway. Only the routing fields are decoded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EnvelopeV2 {
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnvelopeBatch {
    #[serde(default)]
    pub batch: Vec<EnvelopeV2>,
}
