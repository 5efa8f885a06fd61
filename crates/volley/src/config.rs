// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_METRIC_BATCH_INTERVAL, DEFAULT_SUBSCRIPTION_ID, GATEWAY_SERVER_NAME,
};
use crate::delay_range::{parse_duration, DelayRange, DurationRange};
use crate::errors::ConfigError;
use crate::tls::MutualTls;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use volley_metrics::constants::DEFAULT_NAMESPACE;
use volley_metrics::util::parse_metric_namespace;

/// Process configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// v1 traffic controller addresses
    pub tc_addrs: Vec<String>,
    /// Local UDP port metrics are emitted to
    pub metron_port: u16,
    /// v2 gateway addresses. v2 egress only runs when set.
    pub rlp_addrs: Vec<String>,
    pub metric_batch_interval: Duration,
    /// Prefix of every emitted counter name
    pub metric_namespace: Option<String>,
    pub etcd_addrs: Vec<String>,
    pub syslog_drain_urls: Vec<String>,
    pub auth_token: String,
    pub firehose_count: usize,
    pub stream_count: usize,
    pub recent_log_count: usize,
    pub container_metric_count: usize,
    /// Number of drain bindings to advertise and to serve per provisioning request
    pub syslog_drains: usize,
    pub syslog_ttl: Duration,
    pub subscription_id: String,
    pub receive_delay: DurationRange,
    pub async_request_delay: DurationRange,
    pub kill_delay: DurationRange,
    /// Port of the mock provisioning server
    pub cups_port: u16,
    /// Mutual TLS for the provisioning server. Plain HTTP when unset.
    pub cups_tls: Option<MutualTls>,
    /// Client identity for v2 gateways, verified against `reverselogproxy`
    pub v2_tls: Option<MutualTls>,
    /// Ask v2 gateways for tags in place of deprecated envelope fields
    pub use_preferred_tags: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tc_addrs: Vec::new(),
            metron_port: 0,
            rlp_addrs: Vec::new(),
            metric_batch_interval: DEFAULT_METRIC_BATCH_INTERVAL,
            metric_namespace: Some(DEFAULT_NAMESPACE.to_string()),
            etcd_addrs: Vec::new(),
            syslog_drain_urls: Vec::new(),
            auth_token: String::new(),
            firehose_count: 0,
            stream_count: 0,
            recent_log_count: 0,
            container_metric_count: 0,
            syslog_drains: 0,
            syslog_ttl: Duration::ZERO,
            subscription_id: DEFAULT_SUBSCRIPTION_ID.to_string(),
            receive_delay: DurationRange::ZERO,
            async_request_delay: DurationRange::ZERO,
            kill_delay: DurationRange::ZERO,
            cups_port: 0,
            cups_tls: None,
            v2_tls: None,
            use_preferred_tags: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let tc_addrs = list("TC_ADDRS");
        if tc_addrs.is_empty() {
            return Err(ConfigError::Missing("TC_ADDRS"));
        }
        let metron_port = required("METRON_PORT")?;
        let cups_port = required("CUPS_PORT")?;
        let cups_tls = all_or_none([
            "CUPS_SERVER_CERT",
            "CUPS_SERVER_KEY",
            "CUPS_SERVER_CA",
            "CUPS_SERVER_CN",
        ])?
        .map(|[cert, key, ca, cn]| MutualTls {
            cert_path: cert.into(),
            key_path: key.into(),
            ca_path: ca.into(),
            server_name: cn,
        });
        let v2_tls = all_or_none(["V2_TLS_CERT_PATH", "V2_TLS_KEY_PATH", "V2_TLS_CA_PATH"])?.map(
            |[cert, key, ca]| MutualTls {
                cert_path: cert.into(),
                key_path: key.into(),
                ca_path: ca.into(),
                server_name: GATEWAY_SERVER_NAME.to_string(),
            },
        );

        let config = Self {
            tc_addrs,
            metron_port,
            rlp_addrs: list("RLP_ADDRS"),
            metric_batch_interval: duration("METRIC_BATCH_INTERVAL")?
                .unwrap_or(defaults.metric_batch_interval),
            metric_namespace: match non_empty("METRIC_NAMESPACE") {
                Some(namespace) => parse_metric_namespace(&namespace),
                None => defaults.metric_namespace,
            },
            etcd_addrs: list("ETCD_ADDRS"),
            syslog_drain_urls: list("SYSLOG_DRAIN_URLS"),
            auth_token: env::var("AUTH_TOKEN").unwrap_or_default(),
            firehose_count: optional("FIREHOSE_COUNT")?.unwrap_or(defaults.firehose_count),
            stream_count: optional("STREAM_COUNT")?.unwrap_or(defaults.stream_count),
            recent_log_count: optional("RECENT_LOG_COUNT")?.unwrap_or(defaults.recent_log_count),
            container_metric_count: optional("CONTAINER_METRIC_COUNT")?
                .unwrap_or(defaults.container_metric_count),
            syslog_drains: optional("SYSLOG_DRAINS")?.unwrap_or(defaults.syslog_drains),
            syslog_ttl: duration("SYSLOG_TTL")?.unwrap_or(defaults.syslog_ttl),
            subscription_id: non_empty("SUB_ID").unwrap_or(defaults.subscription_id),
            receive_delay: range("RECV_DELAY")?,
            async_request_delay: range("ASYNC_REQUEST_DELAY")?,
            kill_delay: range("KILL_DELAY")?,
            cups_port,
            cups_tls,
            v2_tls,
            use_preferred_tags: flag("USE_PREFERRED_TAGS")?.unwrap_or(defaults.use_preferred_tags),
            log_level: non_empty("VOLLEY_LOG_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tc_addrs.is_empty() {
            return Err(ConfigError::Missing("TC_ADDRS"));
        }
        if self.metron_port == 0 {
            return Err(invalid("METRON_PORT", "0", "port must be greater than 0"));
        }
        if self.cups_port == 0 {
            return Err(invalid("CUPS_PORT", "0", "port must be greater than 0"));
        }
        if self.metric_batch_interval.is_zero() {
            return Err(invalid(
                "METRIC_BATCH_INTERVAL",
                "0s",
                "interval must be greater than 0",
            ));
        }

        // A configured kill delay must be usable as a delay generator.
        if !self.kill_delay.is_zero_width() {
            if let Err(e) = DelayRange::try_from(self.kill_delay) {
                return Err(invalid(
                    "KILL_DELAY",
                    &format!("{:?}-{:?}", self.kill_delay.min, self.kill_delay.max),
                    &e.to_string(),
                ));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(invalid(
                "VOLLEY_LOG_LEVEL",
                &self.log_level,
                "must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }

    /// Identifier store capacity. Stream connections are what the sampled identifiers feed.
    pub fn id_store_capacity(&self) -> usize {
        self.stream_count.max(1)
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

/// Comma-separated list, blank entries dropped.
fn list(name: &str) -> Vec<String> {
    non_empty(name)
        .map(|val| {
            val.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn optional<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(name)
        .map(|val| val.parse::<T>().map_err(|e| invalid(name, &val, &e.to_string())))
        .transpose()
}

fn required<T>(name: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(name)?.ok_or(ConfigError::Missing(name))
}

fn duration(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    non_empty(name)
        .map(|val| parse_duration(&val).map_err(|e| invalid(name, &val, &e.to_string())))
        .transpose()
}

fn range(name: &'static str) -> Result<DurationRange, ConfigError> {
    Ok(optional(name)?.unwrap_or(DurationRange::ZERO))
}

fn flag(name: &'static str) -> Result<Option<bool>, ConfigError> {
    non_empty(name)
        .map(|val| match val.to_lowercase().as_str() {
            "1" | "t" | "true" => Ok(true),
            "0" | "f" | "false" => Ok(false),
            _ => Err(invalid(name, &val, "expected true or false")),
        })
        .transpose()
}

/// Settings that only make sense together: either every variable is set or none is.
fn all_or_none<const N: usize>(
    names: [&'static str; N],
) -> Result<Option<[String; N]>, ConfigError> {
    let values = names.map(non_empty);
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    let mut found = names.map(|_| String::new());
    for ((slot, value), name) in found.iter_mut().zip(values).zip(names) {
        *slot = value.ok_or(ConfigError::Missing(name))?;
    }
    Ok(Some(found))
}
