// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The counter-recording interface shared by every volley component.
//!
//! ```
//! use std::sync::Mutex;
//! use volley_metrics::metric::SortedTags;
//! use volley_metrics::sink::{BatchCounterExt, MetricSink};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<(String, SortedTags, u64)>>);
//!
//! impl MetricSink for Recorder {
//!     fn add_counter(&self, name: &str, tags: SortedTags, delta: u64) {
//!         self.0.lock().unwrap().push((name.to_string(), tags, delta));
//!     }
//! }
//!
//! let recorder = Recorder::default();
//! recorder
//!     .batch_counter("open-connections")
//!     .with_tag("conn_type", "firehose")
//!     .increment();
//! assert_eq!(recorder.0.lock().unwrap()[0].2, 1);
//! ```

use crate::metric::SortedTags;

/// Destination for counter deltas. Implementations must never block the caller.
pub trait MetricSink: Send + Sync {
    fn add_counter(&self, name: &str, tags: SortedTags, delta: u64);
}

/// Builder for a single counter emission.
#[must_use = "a batch counter records nothing until `increment` or `add` is called"]
pub struct BatchCounter<'a, S: MetricSink + ?Sized> {
    sink: &'a S,
    name: &'a str,
    tags: Vec<(&'a str, &'a str)>,
}

impl<'a, S: MetricSink + ?Sized> BatchCounter<'a, S> {
    pub fn with_tag(mut self, key: &'a str, value: &'a str) -> Self {
        self.tags.push((key, value));
        self
    }

    pub fn increment(self) {
        self.add(1);
    }

    pub fn add(self, delta: u64) {
        self.sink
            .add_counter(self.name, SortedTags::from_pairs(self.tags), delta);
    }
}

pub trait BatchCounterExt: MetricSink {
    fn batch_counter<'a>(&'a self, name: &'a str) -> BatchCounter<'a, Self>;
}

impl<S: MetricSink + ?Sized> BatchCounterExt for S {
    fn batch_counter<'a>(&'a self, name: &'a str) -> BatchCounter<'a, Self> {
        BatchCounter {
            sink: self,
            name,
            tags: Vec::new(),
        }
    }
}

/// Sink that discards everything, for components started without metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricSink for NoopSink {
    fn add_counter(&self, _name: &str, _tags: SortedTags, _delta: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        counters: Mutex<Vec<(String, SortedTags, u64)>>,
    }

    impl MetricSink for Recorder {
        fn add_counter(&self, name: &str, tags: SortedTags, delta: u64) {
            self.counters
                .lock()
                .unwrap()
                .push((name.to_string(), tags, delta));
        }
    }

    #[test]
    fn test_builder_through_trait_object() {
        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn MetricSink> = recorder.clone();

        sink.batch_counter("received-envelopes")
            .with_tag("version", "v2")
            .add(1000);
        sink.batch_counter("open-connections").increment();

        let counters = recorder.counters.lock().unwrap();
        assert_eq!(counters.len(), 2);
        assert_eq!(counters[0].0, "received-envelopes");
        assert_eq!(counters[0].1.get("version"), Some("v2"));
        assert_eq!(counters[0].2, 1000);
        assert!(counters[1].1.is_empty());
        assert_eq!(counters[1].2, 1);
    }
}
