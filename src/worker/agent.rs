//! Worker agent: register, heartbeat, poll, execute, report, reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::executor::PayloadExecutor;
use super::state::AgentState;
use super::transport::{Connection, Connector};
use crate::config::WorkerConfig;
use crate::error::{self, ChannelError, Error, ProtocolError};
use crate::protocol::{Reply, Request, TaskBatch};

/// Per-connection bookkeeping.
struct Session {
    conn: Box<dyn Connection>,
    last_heartbeat: Instant,
}

/// A single worker: one identity, one connection at a time.
///
/// Channel failures never escape `run()`: the connection is dropped, the
/// agent waits out the reconnect backoff and starts over with REGISTER.
pub struct WorkerAgent {
    config: WorkerConfig,
    connector: Arc<dyn Connector>,
    executor: Arc<dyn PayloadExecutor>,
    state_tx: watch::Sender<AgentState>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerAgent {
    pub fn new(
        config: WorkerConfig,
        connector: Arc<dyn Connector>,
        executor: Arc<dyn PayloadExecutor>,
    ) -> Self {
        let (state_tx, _rx) = watch::channel(AgentState::Disconnected);
        Self {
            config,
            connector,
            executor,
            state_tx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    pub fn state(&self) -> AgentState {
        *self.state_tx.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state_tx.subscribe()
    }

    /// Set the returned flag to stop `run()` at the next request boundary.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn set_state(&self, next: AgentState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Unexpected agent state transition");
        }
        debug!(from = %current, to = %next, "Agent state");
        self.state_tx.send_replace(next);
    }

    /// Run until the shutdown flag is set.
    pub async fn run(&self) {
        info!(
            worker_id = %self.config.worker_id,
            class = %self.config.class,
            "Worker agent started"
        );

        while !self.stopping() {
            match self.run_session().await {
                Ok(()) => break,
                Err(e) => {
                    self.set_state(AgentState::Disconnected);
                    warn!(
                        worker_id = %self.config.worker_id,
                        error = %e,
                        backoff_secs = self.config.reconnect_backoff.as_secs_f64(),
                        "Connection failed, retrying after backoff"
                    );
                    tokio::time::sleep(self.config.reconnect_backoff).await;
                }
            }
        }

        self.set_state(AgentState::Disconnected);
        info!(worker_id = %self.config.worker_id, "Worker agent stopped");
    }

    /// One connection's lifetime. Ok only on shutdown.
    async fn run_session(&self) -> error::Result<()> {
        self.set_state(AgentState::Connecting);
        let timeout = self.config.request_timeout;
        let conn = tokio::time::timeout(timeout, self.connector.connect())
            .await
            .map_err(|_| ChannelError::Timeout { timeout })??;
        info!(worker_id = %self.config.worker_id, "Connected to dispatcher");

        let mut session = Session {
            conn,
            last_heartbeat: Instant::now(),
        };
        let result = self.drive(&mut session).await;
        session.conn.close().await;
        result
    }

    async fn drive(&self, session: &mut Session) -> error::Result<()> {
        self.register(session).await?;

        loop {
            if self.stopping() {
                return Ok(());
            }

            self.set_state(AgentState::Idle);
            self.heartbeat_if_due(session).await?;

            self.set_state(AgentState::Requesting);
            match self.exchange(session, Request::get_task(self.worker_id())).await {
                Ok(Reply::Batch(batch)) => {
                    self.set_state(AgentState::Executing);
                    self.execute_batch(session, batch).await?;
                    self.complete(session).await?;
                }
                Ok(Reply::NoTasks) => {
                    self.set_state(AgentState::Idle);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(Reply::Busy) => {
                    // We hold nothing between batches: the reply carrying the
                    // last batch or its ACK was lost.
                    warn!(
                        worker_id = %self.config.worker_id,
                        "Dispatcher still counts us busy, reporting completion to resync"
                    );
                    self.complete(session).await?;
                    self.set_state(AgentState::Idle);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(Reply::RegisterRequired) => {
                    self.register(session).await?;
                }
                Ok(other) => {
                    return Err(unexpected(Request::get_task(self.worker_id()), &other));
                }
                Err(Error::Protocol(ProtocolError::MalformedBatch(reason))) => {
                    warn!(
                        worker_id = %self.config.worker_id,
                        reason = %reason,
                        "Received unparseable batch, reporting completion"
                    );
                    self.set_state(AgentState::Executing);
                    self.complete(session).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One timed request/reply round trip.
    async fn exchange(&self, session: &mut Session, request: Request) -> error::Result<Reply> {
        let timeout = self.config.request_timeout;
        let raw = tokio::time::timeout(timeout, session.conn.exchange(&request.encode()))
            .await
            .map_err(|_| ChannelError::Timeout { timeout })??;
        let reply = Reply::decode(&raw)?;
        debug!(request = %request, reply = %reply, "Exchange");
        Ok(reply)
    }

    async fn register(&self, session: &mut Session) -> error::Result<()> {
        self.set_state(AgentState::Registering);
        let request = Request::register(self.worker_id(), self.config.class.as_str());
        match self.exchange(session, request.clone()).await? {
            Reply::Registered => {
                session.last_heartbeat = Instant::now();
                info!(
                    worker_id = %self.config.worker_id,
                    class = %self.config.class,
                    "Registered with dispatcher"
                );
                Ok(())
            }
            other => Err(unexpected(request, &other)),
        }
    }

    /// Send HEARTBEAT when the interval has elapsed since the last one.
    async fn heartbeat_if_due(&self, session: &mut Session) -> error::Result<()> {
        if session.last_heartbeat.elapsed() < self.config.heartbeat_interval {
            return Ok(());
        }
        let request = Request::heartbeat(self.worker_id());
        session.last_heartbeat = Instant::now();
        match self.exchange(session, request.clone()).await? {
            Reply::HeartbeatAck => Ok(()),
            Reply::RegisterRequired => {
                info!(worker_id = %self.config.worker_id, "Dispatcher forgot us, re-registering");
                let state = self.state();
                self.register(session).await?;
                // Mid-batch re-registration keeps executing.
                if state == AgentState::Executing {
                    self.state_tx.send_replace(AgentState::Executing);
                }
                Ok(())
            }
            other => Err(unexpected(request, &other)),
        }
    }

    /// Run every payload in order. A failing payload is logged and skipped.
    async fn execute_batch(&self, session: &mut Session, batch: TaskBatch) -> error::Result<()> {
        let total = batch.len();
        info!(worker_id = %self.config.worker_id, payloads = total, "Executing batch");

        let mut failed = 0usize;
        for (index, payload) in batch.into_iter().enumerate() {
            self.heartbeat_if_due(session).await?;

            match self.executor.execute(&payload).await {
                Ok(()) => debug!(index, "Payload completed"),
                Err(e) => {
                    failed += 1;
                    warn!(
                        worker_id = %self.config.worker_id,
                        index,
                        error = %e,
                        "Payload failed, continuing with batch"
                    );
                }
            }
        }

        info!(
            worker_id = %self.config.worker_id,
            payloads = total,
            failed,
            "Batch finished"
        );
        Ok(())
    }

    async fn complete(&self, session: &mut Session) -> error::Result<()> {
        let request = Request::task_complete(self.worker_id());
        match self.exchange(session, request.clone()).await? {
            Reply::Ack => Ok(()),
            // Evicted while executing; the new record starts available.
            Reply::RegisterRequired => self.register(session).await,
            other => Err(unexpected(request, &other)),
        }
    }
}

fn unexpected(request: Request, reply: &Reply) -> Error {
    ProtocolError::UnexpectedReply {
        request: request.encode(),
        reply: reply.to_string(),
    }
    .into()
}
