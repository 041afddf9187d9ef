//! Dispatcher → worker replies.

use super::batch::TaskBatch;
use crate::error::ProtocolError;

/// A reply: one literal token, or a task batch for a successful GET_TASK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Registered,
    HeartbeatAck,
    Batch(TaskBatch),
    NoTasks,
    Busy,
    Ack,
    RegisterRequired,
    UnknownCommand,
}

impl Reply {
    const TOKENS: [Reply; 7] = [
        Reply::Registered,
        Reply::HeartbeatAck,
        Reply::NoTasks,
        Reply::Busy,
        Reply::Ack,
        Reply::RegisterRequired,
        Reply::UnknownCommand,
    ];

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::Batch(batch) => batch.encode(),
            token => token.token().unwrap_or_default().to_string(),
        }
    }

    /// The literal token, or `None` for a batch.
    pub fn token(&self) -> Option<&'static str> {
        match self {
            Self::Registered => Some("REGISTERED"),
            Self::HeartbeatAck => Some("HEARTBEAT_ACK"),
            Self::NoTasks => Some("NO_TASKS"),
            Self::Busy => Some("BUSY"),
            Self::Ack => Some("ACK"),
            Self::RegisterRequired => Some("REGISTER_REQUIRED"),
            Self::UnknownCommand => Some("UNKNOWN_COMMAND"),
            Self::Batch(_) => None,
        }
    }

    /// Decode reply text. Anything that is not a token must be a batch.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim();
        if let Some(reply) = Self::TOKENS.into_iter().find(|r| r.token() == Some(raw)) {
            return Ok(reply);
        }
        TaskBatch::decode(raw).map(Self::Batch)
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Batch(batch) => write!(f, "<batch of {}>", batch.len()),
            token => f.write_str(token.token().unwrap_or_default()),
        }
    }
}
