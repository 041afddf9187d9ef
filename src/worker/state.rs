//! Worker agent connection state machine.

use serde::{Deserialize, Serialize};

/// Where the agent is in its connect → register → poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// No connection; waiting out the reconnect backoff.
    Disconnected,
    /// Opening a fresh connection.
    Connecting,
    /// Sending REGISTER.
    Registering,
    /// Registered, between requests.
    Idle,
    /// GET_TASK in flight.
    Requesting,
    /// Running a batch.
    Executing,
}

impl AgentState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: AgentState) -> bool {
        use AgentState::*;

        if target == Disconnected {
            return true;
        }

        matches!(
            (self, target),
            (Disconnected, Connecting) |
            (Connecting, Registering) |
            (Registering, Idle) |
            (Idle, Requesting) | (Idle, Registering) |
            (Requesting, Idle) | (Requesting, Executing) | (Requesting, Registering) |
            (Executing, Idle) | (Executing, Registering)
        )
    }

    /// Whether the agent currently holds a connection.
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::Connecting)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Registering => "registering",
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Executing => "executing",
        };
        write!(f, "{s}")
    }
}
