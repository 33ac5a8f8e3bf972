//! Crash log capture for workloads in the error state.

use std::sync::Arc;

use tracing::warn;

use crate::{ClientError, ClientResult, WorkloadClient};

/// Fetches the tail of a failed workload's output for operators.
#[derive(Clone)]
pub struct DiagnosticCapture {
    workloads: Arc<dyn WorkloadClient>,
    tail_lines: u32,
}

impl DiagnosticCapture {
    pub fn new(workloads: Arc<dyn WorkloadClient>, tail_lines: u32) -> Self {
        Self {
            workloads,
            tail_lines,
        }
    }

    pub fn tail_lines(&self) -> u32 {
        self.tail_lines
    }

    /// Fetch the most recent log lines of `name`.
    ///
    /// A name that resolves to no addressable workload is an explicit
    /// failure, never an empty success.
    pub async fn capture(&self, name: &str) -> ClientResult<String> {
        if name.trim().is_empty() {
            return Err(ClientError::EmptyRequestPath(
                "logs of unnamed workload".to_string(),
            ));
        }
        self.workloads.workload_logs(name, self.tail_lines).await
    }

    /// Capture and log crash output. Never fails.
    pub async fn report_crash(&self, name: &str) {
        match self.capture(name).await {
            Ok(logs) => warn!(instance = %name, logs = %logs, "Instance crashed"),
            Err(e) => warn!(instance = %name, error = %e, "Instance crashed, but cannot get log"),
        }
    }
}
