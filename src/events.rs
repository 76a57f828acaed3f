use crate::task::TaskStatus;

/// Structured lifecycle events emitted by the task client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Submitted {
        task_id: u64,
        client_id: String,
        model: String,
    },
    Polled {
        task_id: u64,
        attempt: u32,
        code: i64,
    },
    StatusChanged {
        task_id: u64,
        from: TaskStatus,
        to: TaskStatus,
        elapsed_ms: u64,
    },
    StatusRegressed {
        task_id: u64,
        current: TaskStatus,
        reported: TaskStatus,
    },
    UnknownStatus {
        task_id: u64,
        code: i64,
    },
    Succeeded {
        task_id: u64,
        elapsed_ms: u64,
    },
    Aborted {
        task_id: u64,
        reason: String,
    },
    TimedOut {
        task_id: u64,
        elapsed_ms: u64,
    },
    Cancelled {
        task_id: Option<u64>,
        elapsed_ms: u64,
    },
    ResultFetched {
        task_id: u64,
        bytes: u64,
    },
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: TaskEvent);
}

/// Forwards events to `tracing`. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: TaskEvent) {
        match event {
            TaskEvent::Submitted {
                task_id,
                client_id,
                model,
            } => {
                tracing::info!(task_id, client_id = %client_id, model = %model, "task created");
            }
            TaskEvent::Polled {
                task_id,
                attempt,
                code,
            } => {
                tracing::trace!(task_id, attempt, code, "task status polled");
            }
            TaskEvent::StatusChanged {
                task_id,
                from,
                to,
                elapsed_ms,
            } => {
                tracing::debug!(
                    task_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    elapsed_ms,
                    "task status changed"
                );
            }
            TaskEvent::StatusRegressed {
                task_id,
                current,
                reported,
            } => {
                tracing::warn!(
                    task_id,
                    current = current.as_str(),
                    reported = reported.as_str(),
                    "bridge reported an earlier status, ignoring"
                );
            }
            TaskEvent::UnknownStatus { task_id, code } => {
                tracing::warn!(task_id, code, "unknown task status, still waiting");
            }
            TaskEvent::Succeeded {
                task_id,
                elapsed_ms,
            } => {
                tracing::info!(task_id, elapsed_ms, "task succeeded");
            }
            TaskEvent::Aborted { task_id, reason } => {
                tracing::error!(task_id, reason = %reason, "task aborted");
            }
            TaskEvent::TimedOut {
                task_id,
                elapsed_ms,
            } => {
                tracing::error!(task_id, elapsed_ms, "task timed out");
            }
            TaskEvent::Cancelled {
                task_id,
                elapsed_ms,
            } => {
                tracing::info!(?task_id, elapsed_ms, "task cancelled");
            }
            TaskEvent::ResultFetched { task_id, bytes } => {
                tracing::info!(task_id, bytes, "task result fetched");
            }
        }
    }
}
