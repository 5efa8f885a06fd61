// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::Assaulter;
use crate::envelope::Selector;
use crate::id_store::IdStore;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EgressV2Counts {
    pub firehose: usize,
    pub app_stream: usize,
    pub app_log_stream: usize,
}

/// Fans out v2 assault loops: unscoped firehoses, per-source streams and per-source log streams.
pub struct EgressV2 {
    assaulter: Arc<dyn Assaulter>,
    id_store: Arc<dyn IdStore>,
    counts: EgressV2Counts,
}

impl EgressV2 {
    pub fn new(
        assaulter: Arc<dyn Assaulter>,
        id_store: Arc<dyn IdStore>,
        counts: EgressV2Counts,
    ) -> Self {
        EgressV2 {
            assaulter,
            id_store,
            counts,
        }
    }

    /// Launches every loop at once. Source-scoped loops first wait for an identifier from the
    /// store.
    pub fn start(&self) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        debug!("Starting v2 egress: {:?}", self.counts);

        for _ in 0..self.counts.firehose {
            let assaulter = Arc::clone(&self.assaulter);
            tasks.spawn(async move { assaulter.assault(Selector::firehose()).await });
        }
        for _ in 0..self.counts.app_stream {
            let assaulter = Arc::clone(&self.assaulter);
            let id_store = Arc::clone(&self.id_store);
            tasks.spawn(async move {
                let selector = Selector::source(id_store.get().await);
                assaulter.assault(selector).await
            });
        }
        for _ in 0..self.counts.app_log_stream {
            let assaulter = Arc::clone(&self.assaulter);
            let id_store = Arc::clone(&self.id_store);
            tasks.spawn(async move {
                let selector = Selector::source_logs(id_store.get().await);
                assaulter.assault(selector).await
            });
        }

        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageSelector;
    use crate::id_store::WeightedIdStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAssaulter {
        selectors: Mutex<Vec<Selector>>,
    }

    impl RecordingAssaulter {
        fn count(&self, predicate: impl Fn(&Selector) -> bool) -> usize {
            self.selectors
                .lock()
                .unwrap()
                .iter()
                .filter(|s| predicate(s))
                .count()
        }
    }

    #[async_trait]
    impl Assaulter for RecordingAssaulter {
        async fn assault(&self, selector: Selector) {
            self.selectors.lock().unwrap().push(selector);
        }
    }

    fn store(ids: &[&str]) -> Arc<WeightedIdStore> {
        let store = Arc::new(WeightedIdStore::new(ids.len()));
        for id in ids {
            store.add(id);
        }
        store
    }

    async fn run(counts: EgressV2Counts, ids: &[&str]) -> Arc<RecordingAssaulter> {
        let assaulter = Arc::new(RecordingAssaulter::default());
        let egress = EgressV2::new(
            Arc::clone(&assaulter) as Arc<dyn Assaulter>,
            store(ids),
            counts,
        );
        let mut tasks = egress.start();
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }
        assaulter
    }

    #[tokio::test]
    async fn test_opens_firehose_loops() {
        let assaulter = run(
            EgressV2Counts {
                firehose: 10,
                ..Default::default()
            },
            &["app-id-1"],
        )
        .await;
        assert_eq!(assaulter.count(|s| *s == Selector::firehose()), 10);
    }

    #[tokio::test]
    async fn test_opens_source_streams_from_the_store() {
        let apps = ["app-id-1", "app-id-2"];
        let assaulter = run(
            EgressV2Counts {
                app_stream: 3,
                ..Default::default()
            },
            &apps,
        )
        .await;
        assert_eq!(
            assaulter.count(|s| {
                s.message.is_none()
                    && s.source_id
                        .as_deref()
                        .is_some_and(|id| apps.contains(&id))
            }),
            3
        );
    }

    #[tokio::test]
    async fn test_opens_source_log_streams() {
        let apps = ["app-id-1", "app-id-2"];
        let assaulter = run(
            EgressV2Counts {
                app_log_stream: 7,
                ..Default::default()
            },
            &apps,
        )
        .await;
        assert_eq!(
            assaulter.count(|s| {
                s.message == Some(MessageSelector::Log)
                    && s.source_id
                        .as_deref()
                        .is_some_and(|id| apps.contains(&id))
            }),
            7
        );
    }

    #[tokio::test]
    async fn test_source_streams_wait_for_the_store() {
        let assaulter = Arc::new(RecordingAssaulter::default());
        let id_store = Arc::new(WeightedIdStore::new(2));
        let egress = EgressV2::new(
            Arc::clone(&assaulter) as Arc<dyn Assaulter>,
            Arc::clone(&id_store) as Arc<dyn IdStore>,
            EgressV2Counts {
                firehose: 1,
                app_stream: 2,
                ..Default::default()
            },
        );

        let mut tasks = egress.start();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(assaulter.count(|_| true), 1);

        id_store.add("app-id-1");
        id_store.add("app-id-2");
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }
        assert_eq!(assaulter.count(|s| s.source_id.is_some()), 2);
    }
}
