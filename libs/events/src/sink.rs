//! Event sinks.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{EventType, LifecycleEvent};

/// Destination for lifecycle events.
///
/// Emission is fire-and-forget: implementations must swallow (and log)
/// their own delivery failures.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: LifecycleEvent);
}

/// Sink that writes events to the tracing log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: LifecycleEvent) {
        match event.event_type {
            EventType::Normal => info!(
                object = %event.involved_object,
                reason = %event.reason,
                message = %event.message,
                "Lifecycle event"
            ),
            EventType::Warning => warn!(
                object = %event.involved_object,
                reason = %event.reason,
                message = %event.message,
                "Lifecycle event"
            ),
        }
    }
}
