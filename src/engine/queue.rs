// src/engine/queue.rs

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, warn};

use crate::types::TriggerWhileRunningBehaviour;

use super::{TaskName, TriggerReason};

/// A trigger waiting for the active run to finish.
pub type QueuedTrigger = (TaskName, TriggerReason);

/// Queue of triggers that arrive while a DAG run is already executing.
///
/// Each queued entry is a *batch* of triggers for one future run and
/// `max_runs` (`[config].queue_length`) bounds how many batches are kept.
/// When the runtime goes idle it calls [`TriggerQueue::drain_pending`],
/// which merges every batch into the trigger set of the next run.
///
/// In `Queue` mode repeated triggers coalesce into the last batch, so a
/// burst of saves while a build runs yields one follow-up run. In `Cancel`
/// mode the queued batches are replaced by the latest trigger only; the
/// running DAG itself is never interrupted.
#[derive(Debug)]
pub struct TriggerQueue {
    behaviour: TriggerWhileRunningBehaviour,
    max_runs: usize,
    runs: VecDeque<BTreeSet<QueuedTrigger>>,
}

impl TriggerQueue {
    /// `max_runs` is clamped to at least 1.
    pub fn new(behaviour: TriggerWhileRunningBehaviour, max_runs: usize) -> Self {
        Self {
            behaviour,
            max_runs: max_runs.max(1),
            runs: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn behaviour(&self) -> TriggerWhileRunningBehaviour {
        self.behaviour
    }

    /// Number of queued batches.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Record that a task was triggered while a DAG run is in progress.
    pub fn record_trigger(&mut self, task: &str, reason: TriggerReason) {
        let entry = (task.to_string(), reason);

        match self.behaviour {
            TriggerWhileRunningBehaviour::Queue => {
                if let Some(last_batch) = self.runs.back_mut() {
                    let inserted = last_batch.insert(entry);
                    debug!(task = %task, inserted, "merged trigger into last queued batch");
                } else {
                    self.runs.push_back(BTreeSet::from([entry]));
                    debug!(task = %task, "created first queued batch");
                }

                if self.runs.len() > self.max_runs {
                    warn!(
                        current_batches = self.runs.len(),
                        max_runs = self.max_runs,
                        "queue_length exceeded; dropping oldest queued batches"
                    );
                    while self.runs.len() > self.max_runs {
                        self.runs.pop_front();
                    }
                }
            }
            TriggerWhileRunningBehaviour::Cancel => {
                debug!(task = %task, "replacing queued triggers with the latest one");
                self.runs.clear();
                self.runs.push_back(BTreeSet::from([entry]));
            }
        }
    }

    /// Drain every queued batch into one sorted, de-duplicated trigger list.
    pub fn drain_pending(&mut self) -> Vec<QueuedTrigger> {
        let mut merged: BTreeSet<QueuedTrigger> = BTreeSet::new();
        while let Some(batch) = self.runs.pop_front() {
            merged.extend(batch);
        }

        let triggers: Vec<QueuedTrigger> = merged.into_iter().collect();
        debug!(drained = triggers.len(), "drained queued triggers into new run");
        triggers
    }
}
