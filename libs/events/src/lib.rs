//! # bsm-events
//!
//! Lifecycle event vocabulary for storage instances.
//!
//! ## Design Principles
//!
//! - Events are fire-and-forget observability output; nothing reads them
//!   back to make control decisions
//! - Every event is attached to exactly one owning object (engine or replica)
//! - Reason codes are a closed set so operators can filter on them
//!
//! ## Event Reasons
//!
//! - `Start` / `FailedStarting`: workload creation succeeded or failed
//! - `Stop` / `FailedStopping`: workload deletion succeeded or failed

mod sink;
mod types;

pub use sink::{EventSink, TracingEventSink};
pub use types::*;
