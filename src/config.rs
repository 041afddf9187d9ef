//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Name of the catch-all work class.
pub const DEFAULT_CLASS: &str = "default";

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Address the WebSocket / status server binds to.
    pub listen_addr: SocketAddr,
    /// Workers silent for longer than this are evicted.
    pub heartbeat_timeout: Duration,
    /// How often the liveness sweep runs.
    pub sweep_interval: Duration,
    /// Optional JSON file of batches to enqueue at start-up.
    pub seed_file: Option<PathBuf>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let heartbeat_timeout = Duration::from_secs(90);
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 6000)),
            heartbeat_timeout,
            sweep_interval: half_of(heartbeat_timeout),
            seed_file: None,
        }
    }
}

impl DispatcherConfig {
    /// Load from `DISPATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let listen_addr = match lookup("DISPATCH_LISTEN_ADDR") {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| invalid("DISPATCH_LISTEN_ADDR", e))?,
            None => defaults.listen_addr,
        };

        let heartbeat_timeout = secs(&lookup, "DISPATCH_HEARTBEAT_TIMEOUT_SECS")?
            .unwrap_or(defaults.heartbeat_timeout);
        let sweep_interval = secs(&lookup, "DISPATCH_SWEEP_INTERVAL_SECS")?
            .unwrap_or_else(|| half_of(heartbeat_timeout));

        let seed_file = lookup("DISPATCH_SEED_FILE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            listen_addr,
            heartbeat_timeout,
            sweep_interval,
            seed_file,
        })
    }
}

/// Worker agent configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// WebSocket URL of the dispatcher.
    pub server_url: String,
    /// This worker's identity.
    pub worker_id: String,
    /// Work class this worker registers for.
    pub class: String,
    /// Minimum spacing between heartbeats.
    pub heartbeat_interval: Duration,
    /// Wait after NO_TASKS / BUSY before asking again.
    pub poll_interval: Duration,
    /// Wait after a channel failure before reconnecting.
    pub reconnect_backoff: Duration,
    /// Deadline for a single request/reply exchange.
    pub request_timeout: Duration,
    /// Deadline for a single payload.
    pub payload_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:6000/ws".to_string(),
            worker_id: generate_worker_id(),
            class: DEFAULT_CLASS.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            reconnect_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            payload_timeout: Duration::from_secs(300),
        }
    }
}

impl WorkerConfig {
    /// Load from `WORKER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let worker_id = text("WORKER_ID").unwrap_or(defaults.worker_id);
        if !crate::protocol::is_valid_worker_id(&worker_id) {
            return Err(ConfigError::InvalidValue {
                key: "WORKER_ID".to_string(),
                message: format!("{worker_id:?} is not a valid worker identity"),
            });
        }

        let class = text("WORKER_CLASS").unwrap_or(defaults.class);
        if class.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                key: "WORKER_CLASS".to_string(),
                message: "class names cannot contain whitespace".to_string(),
            });
        }

        Ok(Self {
            server_url: text("WORKER_SERVER_URL").unwrap_or(defaults.server_url),
            worker_id,
            class,
            heartbeat_interval: secs(&lookup, "WORKER_HEARTBEAT_INTERVAL_SECS")?
                .unwrap_or(defaults.heartbeat_interval),
            poll_interval: secs(&lookup, "WORKER_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.poll_interval),
            reconnect_backoff: secs(&lookup, "WORKER_RECONNECT_BACKOFF_SECS")?
                .unwrap_or(defaults.reconnect_backoff),
            request_timeout: secs(&lookup, "WORKER_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout),
            payload_timeout: secs(&lookup, "WORKER_PAYLOAD_TIMEOUT_SECS")?
                .unwrap_or(defaults.payload_timeout),
        })
    }
}

/// `worker-` followed by the first 8 hex chars of a v4 UUID.
pub fn generate_worker_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("worker-{}", &id[..8])
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value: u64 = raw.trim().parse().map_err(|e| invalid(key, e))?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1 second".to_string(),
        });
    }
    Ok(Some(Duration::from_secs(value)))
}

fn invalid(key: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: err.to_string(),
    }
}

fn half_of(timeout: Duration) -> Duration {
    (timeout / 2).max(Duration::from_secs(1))
}
