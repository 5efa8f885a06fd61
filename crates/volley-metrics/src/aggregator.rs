// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors;
use crate::metric::{Counter, SortedTags};
use hashbrown::HashMap;
use ustr::Ustr;

type Context = (Ustr, SortedTags);

/// Sums counter deltas per `(name, tags)` context between flushes.
#[derive(Debug)]
pub struct Aggregator {
    tags: SortedTags,
    counters: HashMap<Context, u64>,
    max_context: usize,
}

impl Aggregator {
    /// Creates an aggregator that appends `tags` to every flushed counter and holds at most
    /// `max_context` distinct contexts.
    pub fn new(tags: SortedTags, max_context: usize) -> Result<Self, errors::Creation> {
        if max_context == 0 {
            return Err(errors::Creation::Contexts);
        }
        Ok(Aggregator {
            tags,
            counters: HashMap::with_capacity(max_context.min(1024)),
            max_context,
        })
    }

    pub fn insert(&mut self, counter: Counter) -> Result<(), errors::Insert> {
        let context = (counter.name, counter.tags);
        if let Some(value) = self.counters.get_mut(&context) {
            *value = value.saturating_add(counter.value);
            return Ok(());
        }
        if self.counters.len() >= self.max_context {
            return Err(errors::Insert::Overflow(self.max_context));
        }
        self.counters.insert(context, counter.value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drains every context, merging the aggregator's own tags into each counter.
    pub fn consume_counters(&mut self) -> Vec<Counter> {
        let counters = std::mem::take(&mut self.counters);
        counters
            .into_iter()
            .map(|((name, tags), value)| Counter {
                name,
                tags: self.merge_tags(tags),
                value,
            })
            .collect()
    }

    fn merge_tags(&self, tags: SortedTags) -> SortedTags {
        if self.tags.is_empty() {
            return tags;
        }
        SortedTags::from_pairs(tags.iter().chain(self.tags.iter()))
    }
}
