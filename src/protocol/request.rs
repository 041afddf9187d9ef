//! Worker → dispatcher requests.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DEFAULT_CLASS;
use crate::error::ProtocolError;

const REGISTER: &str = "REGISTER";
const HEARTBEAT: &str = "HEARTBEAT";
const GET_TASK: &str = "GET_TASK";
const TASK_COMPLETE: &str = "TASK_COMPLETE";

static WORKER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@-]{0,127}$").expect("worker id pattern compiles")
});

/// Whether `id` is acceptable as a worker identity on the wire.
pub fn is_valid_worker_id(id: &str) -> bool {
    WORKER_ID_PATTERN.is_match(id)
}

/// A decoded request. Every variant carries the sender's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register { worker_id: String, class: String },
    Heartbeat { worker_id: String },
    GetTask { worker_id: String },
    TaskComplete { worker_id: String },
}

impl Request {
    pub fn register(worker_id: impl Into<String>, class: impl Into<String>) -> Self {
        Self::Register {
            worker_id: worker_id.into(),
            class: class.into(),
        }
    }

    pub fn heartbeat(worker_id: impl Into<String>) -> Self {
        Self::Heartbeat {
            worker_id: worker_id.into(),
        }
    }

    pub fn get_task(worker_id: impl Into<String>) -> Self {
        Self::GetTask {
            worker_id: worker_id.into(),
        }
    }

    pub fn task_complete(worker_id: impl Into<String>) -> Self {
        Self::TaskComplete {
            worker_id: worker_id.into(),
        }
    }

    /// Decode request text.
    ///
    /// `REGISTER:<id>` without a class (or with an empty one) registers to
    /// the default class. Single-identity commands reject extra fields.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (command, rest) = match raw.split_once(':') {
            Some((command, rest)) => (command, Some(rest)),
            None => (raw, None),
        };

        match command {
            REGISTER => {
                let rest = rest.ok_or(ProtocolError::MissingField {
                    command: REGISTER,
                    field: "worker id",
                })?;
                let (worker_id, class) = match rest.split_once(':') {
                    Some((id, class)) => (id, class),
                    None => (rest, ""),
                };
                let worker_id = identity(REGISTER, worker_id)?;
                let class = class.trim();
                let class = if class.is_empty() {
                    DEFAULT_CLASS.to_string()
                } else {
                    class.to_string()
                };
                Ok(Self::Register { worker_id, class })
            }
            HEARTBEAT => Ok(Self::Heartbeat {
                worker_id: single_identity(HEARTBEAT, rest)?,
            }),
            GET_TASK => Ok(Self::GetTask {
                worker_id: single_identity(GET_TASK, rest)?,
            }),
            TASK_COMPLETE => Ok(Self::TaskComplete {
                worker_id: single_identity(TASK_COMPLETE, rest)?,
            }),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::Register { worker_id, class } => format!("{REGISTER}:{worker_id}:{class}"),
            Self::Heartbeat { worker_id } => format!("{HEARTBEAT}:{worker_id}"),
            Self::GetTask { worker_id } => format!("{GET_TASK}:{worker_id}"),
            Self::TaskComplete { worker_id } => format!("{TASK_COMPLETE}:{worker_id}"),
        }
    }

    pub fn worker_id(&self) -> &str {
        match self {
            Self::Register { worker_id, .. }
            | Self::Heartbeat { worker_id }
            | Self::GetTask { worker_id }
            | Self::TaskComplete { worker_id } => worker_id,
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            Self::Register { .. } => REGISTER,
            Self::Heartbeat { .. } => HEARTBEAT,
            Self::GetTask { .. } => GET_TASK,
            Self::TaskComplete { .. } => TASK_COMPLETE,
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

fn single_identity(command: &'static str, rest: Option<&str>) -> Result<String, ProtocolError> {
    let rest = rest.ok_or(ProtocolError::MissingField {
        command,
        field: "worker id",
    })?;
    if rest.contains(':') {
        return Err(ProtocolError::TrailingField { command });
    }
    identity(command, rest)
}

fn identity(command: &'static str, id: &str) -> Result<String, ProtocolError> {
    if id.is_empty() {
        return Err(ProtocolError::MissingField {
            command,
            field: "worker id",
        });
    }
    if !is_valid_worker_id(id) {
        return Err(ProtocolError::MalformedIdentity(id.to_string()));
    }
    Ok(id.to_string())
}
