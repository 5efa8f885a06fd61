// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::RegistryError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// TTL-backed key/value store used for service discovery.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Writes `value` under `key`. A zero `ttl` means the key never expires.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), RegistryError>;
}

/// etcd v2 keys API client. Endpoints are tried in order until one accepts the write.
#[derive(Clone, Debug)]
pub struct EtcdStore {
    endpoints: Vec<String>,
    http: reqwest::Client,
}

impl EtcdStore {
    pub fn new(endpoints: Vec<String>) -> Result<Self, RegistryError> {
        if endpoints.is_empty() {
            return Err(RegistryError::NoEndpoints);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(EtcdStore {
            endpoints: endpoints
                .into_iter()
                .map(|e| e.trim_end_matches('/').to_string())
                .collect(),
            http,
        })
    }

    async fn set_on(
        &self,
        endpoint: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        let url = format!("{endpoint}/v2/keys{key}");
        let ttl_secs = ttl.as_secs().to_string();
        let mut form = vec![("value", value)];
        if !ttl.is_zero() {
            form.push(("ttl", ttl_secs.as_str()));
        }

        let response = self.http.put(&url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for EtcdStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), RegistryError> {
        let mut last_error = RegistryError::NoEndpoints;
        for endpoint in &self.endpoints {
            match self.set_on(endpoint, key, value, ttl).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("etcd endpoint {endpoint} rejected {key}: {e}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
