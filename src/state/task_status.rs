//! Task status definitions for the crawl queue
//!
//! A task moves `Pending -> Processing -> Processed` and never back.
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Lifecycle of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    /// Waiting for a worker
    #[default]
    Pending,

    /// A capture session is running for it
    Processing,

    /// Finished, successfully or not
    Processed,
}

impl TaskStatus {
    /// Returns true once nothing more will happen to the task
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed)
    }

    /// Returns true if `next` is the single step forward from this status
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing) | (Self::Processing, Self::Processed)
        )
    }

    /// String stored in the session file
    ///
    /// An interrupted capture is stored as pending so a resumed crawl runs it again.
    pub fn to_session_string(&self) -> &'static str {
        match self {
            Self::Pending | Self::Processing => "pending",
            Self::Processed => "processed",
        }
    }

    /// Parses a session file status string
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_session_string(s: &str) -> Option<Self> {
        match s {
            "pending" | "processing" => Some(Self::Pending),
            "processed" => Some(Self::Processed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![Self::Pending, Self::Processing, Self::Processed]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
        };
        write!(f, "{}", name)
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.to_session_string())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_session_string(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown task status '{}'", raw)))
    }
}
