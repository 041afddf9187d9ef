//! Dispatcher: the protocol handler and sole owner of registry and queues.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::queues::ClassQueues;
use super::registry::{WorkerRecord, WorkerRegistry};
use crate::config::DispatcherConfig;
use crate::protocol::{Reply, Request, TaskBatch};

/// Registry and queues, mutated together under one lock.
#[derive(Debug, Default)]
struct DispatchState {
    registry: WorkerRegistry,
    queues: ClassQueues,
}

/// Hands out task batches to registered workers.
///
/// Every mutation of worker or queue state goes through this type and takes
/// the same lock, so connections, the liveness sweep and in-process
/// producers are serialized.
pub struct Dispatcher {
    heartbeat_timeout: Duration,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn new(heartbeat_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            heartbeat_timeout,
            state: Mutex::new(DispatchState::default()),
        })
    }

    pub fn from_config(config: &DispatcherConfig) -> Arc<Self> {
        Self::new(config.heartbeat_timeout)
    }

    /// Build from config and load the seed file, if one is configured.
    pub async fn bootstrap(config: &DispatcherConfig) -> crate::error::Result<Arc<Self>> {
        let dispatcher = Self::from_config(config);
        if let Some(path) = &config.seed_file {
            super::seed::seed_from_file(&dispatcher, path).await?;
        }
        Ok(dispatcher)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Queue a batch for `class`. In-process producers only; never on the wire.
    pub async fn enqueue(&self, class: &str, batch: TaskBatch) {
        let payloads = batch.len();
        let mut state = self.state.lock().await;
        let class = state.queues.enqueue(class, batch);
        info!(
            class = %class,
            payloads,
            depth = state.queues.depth(&class),
            "Task batch queued"
        );
    }

    /// Decode, handle and encode one request. Undecodable text gets
    /// `UNKNOWN_COMMAND`.
    pub async fn handle_text(&self, raw: &str) -> String {
        match Request::parse(raw) {
            Ok(request) => self.handle(request).await.encode(),
            Err(e) => {
                warn!(error = %e, request = %raw.trim(), "Rejected request");
                Reply::UnknownCommand.encode()
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Reply {
        self.handle_at(request, Utc::now()).await
    }

    /// Handle a request as of `now`.
    pub async fn handle_at(&self, request: Request, now: DateTime<Utc>) -> Reply {
        let mut state = self.state.lock().await;
        let DispatchState { registry, queues } = &mut *state;

        match request {
            Request::Register { worker_id, class } => {
                if registry.register(&worker_id, &class, now) {
                    info!(worker_id = %worker_id, class = %class, "Worker registered");
                } else {
                    debug!(worker_id = %worker_id, class = %class, "Worker re-registered");
                }
                Reply::Registered
            }

            Request::Heartbeat { worker_id } => {
                if !self.lookup(registry, &worker_id, now) {
                    return Reply::RegisterRequired;
                }
                Reply::HeartbeatAck
            }

            Request::GetTask { worker_id } => {
                if !self.lookup(registry, &worker_id, now) {
                    return Reply::RegisterRequired;
                }
                let Some(record) = registry.get_mut(&worker_id) else {
                    return Reply::RegisterRequired;
                };
                if !record.available {
                    debug!(worker_id = %worker_id, "GET_TASK from busy worker");
                    return Reply::Busy;
                }
                match queues.dequeue(&record.assigned_class) {
                    Some(batch) => {
                        record.mark_busy(batch.len(), now);
                        info!(
                            worker_id = %worker_id,
                            class = %record.assigned_class,
                            payloads = batch.len(),
                            "Batch assigned"
                        );
                        Reply::Batch(batch)
                    }
                    None => Reply::NoTasks,
                }
            }

            Request::TaskComplete { worker_id } => {
                if !self.lookup(registry, &worker_id, now) {
                    return Reply::RegisterRequired;
                }
                let Some(record) = registry.get_mut(&worker_id) else {
                    return Reply::RegisterRequired;
                };
                if record.mark_available() {
                    info!(
                        worker_id = %worker_id,
                        completed = record.batches_completed,
                        "Batch completed"
                    );
                } else {
                    debug!(worker_id = %worker_id, "TASK_COMPLETE from idle worker");
                }
                Reply::Ack
            }
        }
    }

    /// Lazy liveness check plus heartbeat refresh for a known worker.
    fn lookup(&self, registry: &mut WorkerRegistry, worker_id: &str, now: DateTime<Utc>) -> bool {
        if !registry.is_alive(worker_id, self.heartbeat_timeout, now) {
            debug!(worker_id = %worker_id, "Unknown worker, registration required");
            return false;
        }
        registry.touch_heartbeat(worker_id, now)
    }

    /// Evict every worker past the heartbeat timeout. Returns evicted ids.
    pub async fn sweep(&self) -> Vec<String> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.state.lock().await;
        state
            .registry
            .sweep(self.heartbeat_timeout, now)
            .into_iter()
            .map(|record| record.worker_id)
            .collect()
    }

    pub async fn worker(&self, worker_id: &str) -> Option<WorkerRecord> {
        self.state.lock().await.registry.get(worker_id).cloned()
    }

    pub async fn workers(&self) -> Vec<WorkerRecord> {
        self.state.lock().await.registry.snapshot()
    }

    pub async fn queue_depths(&self) -> BTreeMap<String, usize> {
        self.state.lock().await.queues.depths()
    }

    /// Batches waiting across every class.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.queues.total()
    }
}
