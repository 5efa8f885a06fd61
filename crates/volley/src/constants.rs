// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const OPEN_CONNECTIONS: &str = "open-connections";
pub const CLOSED_CONNECTIONS: &str = "closed-connections";
pub const RECEIVED_ENVELOPES: &str = "received-envelopes";
pub const NUMBER_OF_REQUESTS: &str = "number-of-requests";
pub const NUMBER_OF_REQUEST_ERRORS: &str = "number-of-request-errors";

pub const CONN_TYPE: &str = "conn_type";
pub const FIREHOSE: &str = "firehose";
pub const STREAM: &str = "stream";
pub const RECENT_LOGS: &str = "recentlogs";
pub const CONTAINER_METRICS: &str = "containermetrics";

pub const VERSION: &str = "version";
pub const V2: &str = "v2";

/// Source identifier reserved for platform-internal traffic. Never sampled.
pub const SYSTEM_SOURCE_ID: &str = "system";

/// Envelopes are counted locally and reported in batches of this size.
pub const RECEIVED_BATCH_SIZE: u64 = 1000;

pub const DRAIN_KEY_PREFIX: &str = "/loggregator/services";

/// Base lifetime of a v2 receive stream before it is torn down and reopened.
pub const STREAM_LIFETIME: Duration = Duration::from_secs(60);
/// Upper bound of the random extension added to [`STREAM_LIFETIME`].
pub const STREAM_LIFETIME_JITTER: Duration = Duration::from_secs(30);
/// Name every v2 gateway certificate is verified against.
pub const GATEWAY_SERVER_NAME: &str = "reverselogproxy";

pub const DRAIN_VERSION_SUFFIX: &str = "/?drain-version=2.0";
pub const PROVISIONED_HOSTNAME: &str = "org.space.appname";

pub const DEFAULT_SUBSCRIPTION_ID: &str = "volley";
pub const DEFAULT_METRIC_BATCH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LOG_LEVEL: &str = "info";
