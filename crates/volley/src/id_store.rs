// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frequency-weighted sampling of observed source identifiers.
//!
//! Identifiers are written round-robin into a fixed ring, overwriting the oldest entry. An
//! identifier seen twice as often occupies roughly twice as many slots, so a uniformly random
//! slot picks sources in proportion to their traffic.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[async_trait]
pub trait IdStore: Send + Sync {
    /// Records one observation of `id`.
    fn add(&self, id: &str);

    /// Waits until the store has been filled once, then returns a weighted random identifier.
    async fn get(&self) -> String;

    /// Returns up to `n` identifiers from distinct slots without waiting.
    fn get_n(&self, n: usize) -> Vec<String>;
}

#[derive(Debug)]
pub struct WeightedIdStore {
    slots: Box<[ArcSwapOption<String>]>,
    cursor: AtomicU64,
    stored: AtomicU64,
    ready: watch::Sender<bool>,
}

impl WeightedIdStore {
    /// Creates a store with `capacity` slots. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (ready, _) = watch::channel(false);
        WeightedIdStore {
            slots: (0..capacity).map(|_| ArcSwapOption::empty()).collect(),
            cursor: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            ready,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    fn capacity_u64(&self) -> u64 {
        self.slots.len() as u64
    }

    fn slot(&self, index: usize) -> Option<String> {
        self.slots[index].load_full().map(|id| id.as_ref().clone())
    }
}

#[async_trait]
impl IdStore for WeightedIdStore {
    fn add(&self, id: &str) {
        let position = self.cursor.fetch_add(1, Ordering::AcqRel);
        // Remainder is below the slot count, so it fits in usize.
        let index = (position % self.capacity_u64()) as usize;
        self.slots[index].store(Some(Arc::new(id.to_string())));

        let stored = self.stored.fetch_add(1, Ordering::AcqRel) + 1;
        if stored == self.capacity_u64() {
            self.ready.send_replace(true);
        }
    }

    async fn get(&self) -> String {
        let mut ready = self.ready.subscribe();
        // The sender lives as long as `self`, so this cannot fail while we are borrowed.
        let _ = ready.wait_for(|ready| *ready).await;

        loop {
            let index = rand::rng().random_range(0..self.slots.len());
            if let Some(id) = self.slot(index) {
                return id;
            }
            // A writer that claimed this slot before readiness fired has not stored yet.
            tokio::task::yield_now().await;
        }
    }

    fn get_n(&self, n: usize) -> Vec<String> {
        let filled = self.stored.load(Ordering::Acquire).min(self.capacity_u64()) as usize;
        let amount = n.min(filled);
        if amount == 0 {
            return Vec::new();
        }

        let mut rng = rand::rng();
        rand::seq::index::sample(&mut rng, filled, amount)
            .into_iter()
            .filter_map(|index| self.slot(index))
            .collect()
    }
}
