// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::DRAIN_KEY_PREFIX;
use crate::errors::RegistryError;
use crate::id_store::IdStore;
use crate::registry::{EtcdStore, RegistryStore};
use rand::seq::IndexedRandom;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Advertises syslog drain bindings for sampled applications into the drain registry.
pub struct SyslogRegistrar {
    store: Option<Arc<dyn RegistryStore>>,
    drain_urls: Vec<String>,
    drain_count: usize,
    ttl: Duration,
    id_store: Arc<dyn IdStore>,
}

impl SyslogRegistrar {
    /// Builds a registrar writing to etcd. Without `etcd_addrs` the registrar does nothing.
    pub fn new(
        ttl: Duration,
        drain_count: usize,
        drain_urls: Vec<String>,
        etcd_addrs: Vec<String>,
        id_store: Arc<dyn IdStore>,
    ) -> Result<Self, RegistryError> {
        let store = if etcd_addrs.is_empty() {
            None
        } else {
            Some(Arc::new(EtcdStore::new(etcd_addrs)?) as Arc<dyn RegistryStore>)
        };
        Ok(Self::with_store(store, ttl, drain_count, drain_urls, id_store))
    }

    pub fn with_store(
        store: Option<Arc<dyn RegistryStore>>,
        ttl: Duration,
        drain_count: usize,
        drain_urls: Vec<String>,
        id_store: Arc<dyn IdStore>,
    ) -> Self {
        SyslogRegistrar {
            store,
            drain_urls,
            drain_count,
            ttl,
            id_store,
        }
    }

    /// Writes `drain_count` bindings one after another.
    pub async fn start(&self) {
        let Some(store) = &self.store else {
            debug!("No drain registry configured, skipping drain registration");
            return;
        };
        for _ in 0..self.drain_count {
            advertise_random(
                self.id_store.as_ref(),
                store.as_ref(),
                &self.drain_urls,
                self.ttl,
            )
            .await;
        }
    }
}

/// Binds a random drain URL to an identifier drawn from `ids`. Failures are logged.
pub async fn advertise_random(
    ids: &dyn IdStore,
    store: &dyn RegistryStore,
    drain_urls: &[String],
    ttl: Duration,
) {
    let Some(drain) = pick(drain_urls) else {
        warn!("No drain URLs to advertise");
        return;
    };
    let id = ids.get().await;
    let key = drain_key(&id, &drain);
    if let Err(e) = store.set(&key, &drain, ttl).await {
        warn!("Failed to advertise drain {drain} for {id}: {e}");
    }
}

fn pick(drain_urls: &[String]) -> Option<String> {
    drain_urls.choose(&mut rand::rng()).cloned()
}

/// `/loggregator/services/<id>/<hex sha256 of url>`
pub fn drain_key(id: &str, drain_url: &str) -> String {
    let digest = Sha256::digest(drain_url.as_bytes());
    format!("{DRAIN_KEY_PREFIX}/{id}/{}", hex::encode(digest))
}
