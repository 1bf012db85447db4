//! Bounded-concurrency execution of per-page tasks.

use std::collections::HashMap;
use std::future::Future;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::tasks::TaskError;
use super::types::CancelFlag;
use crate::models::PageRecord;

/// Counters from one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items never dispatched because the job was cancelled.
    pub not_started: usize,
}

/// Runs one task per page with at most `concurrency` in flight.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Process `items` against the slots of `snapshot`.
    ///
    /// Each item names a slot position and the task's input. The task gets
    /// its own copy of the slot's record; a successful result is written
    /// back into that slot, anything else leaves the slot untouched.
    /// Cancellation is checked before every dispatch. `on_done` runs once
    /// per harvested task, in completion order.
    pub async fn run<I, F, Fut, D>(
        &self,
        snapshot: &mut [PageRecord],
        items: Vec<(usize, I)>,
        cancel: &CancelFlag,
        work: F,
        mut on_done: D,
    ) -> PoolReport
    where
        F: Fn(PageRecord, I) -> Fut,
        Fut: Future<Output = Result<PageRecord, TaskError>> + Send + 'static,
        D: FnMut(&PageRecord, bool),
    {
        let mut report = PoolReport::default();
        let mut set = JoinSet::new();
        let mut slots = HashMap::new();
        let mut queue = items.into_iter();

        loop {
            while set.len() < self.concurrency && !cancel.is_cancelled() {
                let Some((pos, input)) = queue.next() else {
                    break;
                };
                let handle = set.spawn(work(snapshot[pos].clone(), input));
                slots.insert(handle.id(), pos);
                report.dispatched += 1;
            }

            let Some(joined) = set.join_next_with_id().await else {
                break;
            };

            let (pos, success) = match joined {
                Ok((id, Ok(page))) => {
                    let Some(pos) = slots.remove(&id) else {
                        continue;
                    };
                    if page.index != snapshot[pos].index {
                        warn!(
                            "Task for page {} returned page {}, discarding",
                            snapshot[pos].index, page.index
                        );
                        (pos, false)
                    } else {
                        debug!("Page {} done", page.index);
                        snapshot[pos] = page;
                        (pos, true)
                    }
                }
                Ok((id, Err(e))) => {
                    let Some(pos) = slots.remove(&id) else {
                        continue;
                    };
                    warn!("{}", e);
                    (pos, false)
                }
                Err(e) => {
                    let Some(pos) = slots.remove(&e.id()) else {
                        continue;
                    };
                    warn!("Page {} task aborted: {}", snapshot[pos].index, e);
                    (pos, false)
                }
            };

            if success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            on_done(&snapshot[pos], success);
        }

        report.not_started = queue.count();
        report
    }
}
