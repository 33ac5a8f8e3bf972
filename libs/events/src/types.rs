//! Event types attached to storage instance objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of object an event is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Engine,
    Replica,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Engine => write!(f, "Engine"),
            ObjectKind::Replica => write!(f, "Replica"),
        }
    }
}

/// Reference to the object that owns an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            resource_version: None,
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Event severity, matching the cluster's event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason codes for workload lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventReason {
    Start,
    FailedStarting,
    Stop,
    FailedStopping,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::Start => "Start",
            EventReason::FailedStarting => "FailedStarting",
            EventReason::Stop => "Stop",
            EventReason::FailedStopping => "FailedStopping",
        }
    }

    /// The event type normally paired with this reason.
    pub fn event_type(&self) -> EventType {
        match self {
            EventReason::Start | EventReason::Stop => EventType::Normal,
            EventReason::FailedStarting | EventReason::FailedStopping => EventType::Warning,
        }
    }
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub involved_object: ObjectRef,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reason: EventReason,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Create an event with the type implied by the reason.
    pub fn new(involved_object: ObjectRef, reason: EventReason, message: impl Into<String>) -> Self {
        Self {
            involved_object,
            event_type: reason.event_type(),
            reason,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}
