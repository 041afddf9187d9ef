//! Worker registry: identity to class, availability, last heartbeat.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// One registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub assigned_class: String,
    /// False from batch hand-out until TASK_COMPLETE.
    pub available: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    /// When the batch currently held was handed out.
    pub assigned_at: Option<DateTime<Utc>>,
    /// Payload count of the batch currently held.
    pub in_flight_payloads: usize,
    pub batches_completed: u64,
}

impl WorkerRecord {
    fn new(worker_id: String, assigned_class: String, now: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            assigned_class,
            available: true,
            last_heartbeat: now,
            registered_at: now,
            assigned_at: None,
            in_flight_payloads: 0,
            batches_completed: 0,
        }
    }

    /// Strictly more than `timeout` since the last heartbeat.
    pub fn is_stale(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        (now - self.last_heartbeat)
            .to_std()
            .map(|elapsed| elapsed > timeout)
            .unwrap_or(false)
    }

    pub(crate) fn mark_busy(&mut self, payloads: usize, now: DateTime<Utc>) {
        self.available = false;
        self.assigned_at = Some(now);
        self.in_flight_payloads = payloads;
    }

    /// Returns whether a held batch was released.
    pub(crate) fn mark_available(&mut self) -> bool {
        let was_busy = !self.available;
        if was_busy {
            self.batches_completed += 1;
        }
        self.available = true;
        self.assigned_at = None;
        self.in_flight_payloads = 0;
        was_busy
    }
}

/// In-memory table of known workers. Performs no eviction on its own.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerRecord>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a worker. Returns true when the record was created.
    ///
    /// A refresh updates the class and heartbeat but leaves availability
    /// alone, so a busy worker stays busy.
    pub fn register(&mut self, worker_id: &str, class: &str, now: DateTime<Utc>) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(record) => {
                if record.assigned_class != class {
                    info!(
                        worker_id = %worker_id,
                        from = %record.assigned_class,
                        to = %class,
                        "Worker re-registered with a new class"
                    );
                    record.assigned_class = class.to_string();
                }
                record.last_heartbeat = now;
                false
            }
            None => {
                self.workers.insert(
                    worker_id.to_string(),
                    WorkerRecord::new(worker_id.to_string(), class.to_string(), now),
                );
                true
            }
        }
    }

    /// Refresh the heartbeat. Returns false for an unknown worker.
    pub fn touch_heartbeat(&mut self, worker_id: &str, now: DateTime<Utc>) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(record) => {
                record.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    /// Liveness check. Evicts the worker and returns false when its last
    /// heartbeat is older than `timeout`; unknown workers are not alive.
    pub fn is_alive(&mut self, worker_id: &str, timeout: Duration, now: DateTime<Utc>) -> bool {
        let stale = match self.workers.get(worker_id) {
            Some(record) => record.is_stale(timeout, now),
            None => return false,
        };
        if stale {
            self.evict(worker_id);
            return false;
        }
        true
    }

    /// Evict every stale worker. Returns the evicted records.
    pub fn sweep(&mut self, timeout: Duration, now: DateTime<Utc>) -> Vec<WorkerRecord> {
        let stale: Vec<String> = self
            .workers
            .values()
            .filter(|r| r.is_stale(timeout, now))
            .map(|r| r.worker_id.clone())
            .collect();

        stale.iter().filter_map(|id| self.evict(id)).collect()
    }

    fn evict(&mut self, worker_id: &str) -> Option<WorkerRecord> {
        let record = self.workers.remove(worker_id)?;
        if record.available {
            info!(
                worker_id = %worker_id,
                last_heartbeat = %record.last_heartbeat,
                "Evicted stale worker"
            );
        } else {
            // No redelivery: the batch goes with the worker.
            warn!(
                worker_id = %worker_id,
                class = %record.assigned_class,
                payloads = record.in_flight_payloads,
                assigned_at = ?record.assigned_at,
                "Evicted stale worker holding a batch; batch lost"
            );
        }
        Some(record)
    }

    pub fn get(&self, worker_id: &str) -> Option<&WorkerRecord> {
        self.workers.get(worker_id)
    }

    pub(crate) fn get_mut(&mut self, worker_id: &str) -> Option<&mut WorkerRecord> {
        self.workers.get_mut(worker_id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// All records, sorted by identity.
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        let mut records: Vec<WorkerRecord> = self.workers.values().cloned().collect();
        records.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        debug!(count = records.len(), "Registry snapshot");
        records
    }
}
