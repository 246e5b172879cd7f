use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, warn};

use crate::tally::{FailureReason, RunTally, TallySnapshot};

/// Result of one item, as reported back to the runner
#[derive(Debug)]
pub enum ItemOutcome<T> {
    Done(T),
    Skipped,
    Failed(FailureReason),
}

#[derive(Debug)]
pub struct RunReport<T> {
    pub processed: usize,
    pub failed: usize,
    pub tally: TallySnapshot,
    /// Successful results keyed by item id
    pub results: BTreeMap<String, T>,
}

impl<T> RunReport<T> {
    pub fn succeeded(&self) -> usize {
        self.tally.succeeded
    }
}

/// Runs per-item work over a bounded pool. A failing item never stops the
/// batch; it is logged and tallied.
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<I, T, F, Fut>(&self, stage: &str, items: Vec<(String, I)>, op: F) -> RunReport<T>
    where
        F: Fn(String, I) -> Fut,
        Fut: Future<Output = ItemOutcome<T>>,
    {
        let tally = RunTally::new();
        let results: DashMap<String, T> = DashMap::new();

        debug!(stage, items = items.len(), concurrency = self.concurrency, "Starting batch");

        let tally_ref = &tally;
        let results_ref = &results;
        stream::iter(items)
            .map(|(id, item)| {
                let work = op(id.clone(), item);
                async move {
                    match work.await {
                        ItemOutcome::Done(value) => {
                            tally_ref.record_success();
                            results_ref.insert(id, value);
                        }
                        ItemOutcome::Skipped => {
                            debug!(stage, item = %id, "Item skipped");
                            tally_ref.record_skip();
                        }
                        ItemOutcome::Failed(reason) => {
                            warn!(stage, item = %id, reason = %reason, "Item failed");
                            tally_ref.record_failure(reason);
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<()>>()
            .await;

        let tally = tally.snapshot();
        tally.log_summary(stage);

        RunReport {
            processed: tally.processed,
            failed: tally.failed,
            tally,
            results: results.into_iter().collect(),
        }
    }
}
