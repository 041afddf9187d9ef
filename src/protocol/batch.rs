//! Task batches: ordered lists of opaque payload strings.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// An ordered, opaque sequence of payloads handed to one worker as a unit.
///
/// Serialized as a JSON array of strings, so payload text may contain
/// anything (colons, quotes, newlines) without escaping on the caller's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskBatch {
    payloads: Vec<String>,
}

impl TaskBatch {
    /// Create a batch from any iterable of payloads.
    pub fn new<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            payloads: payloads.into_iter().map(Into::into).collect(),
        }
    }

    pub fn payloads(&self) -> &[String] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        // A Vec<String> always serializes.
        serde_json::to_string(&self.payloads).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decode a batch reply.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw.trim()).map_err(|e| ProtocolError::MalformedBatch(e.to_string()))
    }
}

impl IntoIterator for TaskBatch {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.payloads.into_iter()
    }
}
