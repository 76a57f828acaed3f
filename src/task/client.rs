use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{TaskError, TransportError};
use crate::events::{EventSink, TaskEvent, TracingEventSink};
use crate::task::status::{Observation, TaskProgress, TaskStatus, UNKNOWN_ABORT_REASON};
use crate::task::{CHAT_TASK_TYPE, TaskHandle, TaskRequest, TaskResult};
use crate::transport::{Envelope, ResultRoute, TaskTransport};

/// Shortest window given to a status read, even right at the deadline.
///
/// Lets the final poll at the deadline still observe `Success`. The cost is
/// that a read started at the deadline which then hangs can finish up to
/// this long after the deadline before `Timeout` is returned.
pub const MIN_STATUS_WINDOW: Duration = Duration::from_secs(1);

/// Timing policy for one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Constant delay between status reads. No backoff.
    pub interval: Duration,
    /// Upper bound on any single bridge call.
    pub request_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives one chat task from submission to its result.
///
/// Each run owns its client id, deadline and progress tracker; the
/// transport and sink are shared read-only, so one client can serve
/// many concurrent runs.
#[derive(Clone)]
pub struct TaskClient {
    transport: Arc<dyn TaskTransport>,
    events: Arc<dyn EventSink>,
    policy: PollPolicy,
}

impl TaskClient {
    pub fn new(transport: Arc<dyn TaskTransport>) -> Self {
        Self {
            transport,
            events: Arc::new(TracingEventSink),
            policy: PollPolicy::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Bound a transport call by `window`.
    async fn bounded<T>(
        op: &'static str,
        window: Duration,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        tokio::time::timeout(window, call)
            .await
            .map_err(|_| TransportError::Timeout {
                op,
                after_ms: window.as_millis() as u64,
            })?
    }

    fn cancelled(&self, task_id: Option<u64>, start: Instant) -> TaskError {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.events.record(TaskEvent::Cancelled {
            task_id,
            elapsed_ms,
        });
        TaskError::Cancelled {
            task_id,
            elapsed_ms,
        }
    }

    fn timed_out(&self, task_id: u64, start: Instant) -> TaskError {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.events.record(TaskEvent::TimedOut {
            task_id,
            elapsed_ms,
        });
        TaskError::Timeout {
            task_id,
            elapsed_ms,
        }
    }

    /// Create the task on the bridge under a fresh client id.
    pub async fn submit(&self, request: &TaskRequest) -> Result<TaskHandle, TaskError> {
        request.validate()?;
        let task_args = request.task_args()?;
        let client_id = Uuid::new_v4().to_string();

        let task_id = Self::bounded(
            "create",
            self.policy.request_timeout,
            self.transport
                .create_task(&client_id, &task_args, CHAT_TASK_TYPE),
        )
        .await?;

        self.events.record(TaskEvent::Submitted {
            task_id,
            client_id: client_id.clone(),
            model: request.model.clone(),
        });
        Ok(TaskHandle::new(task_id, client_id))
    }

    /// Poll until the task succeeds, aborts, the timeout elapses or
    /// `cancel` fires. Transport failures end the wait immediately.
    pub async fn await_completion(
        &self,
        handle: &TaskHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        let task_id = handle.id();
        let start = Instant::now();
        let deadline = start + timeout;
        let mut progress = TaskProgress::new();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let window = deadline
                .saturating_duration_since(Instant::now())
                .min(self.policy.request_timeout)
                .max(MIN_STATUS_WINDOW);
            let status_read = Self::bounded(
                "status",
                window,
                self.transport.get_status(handle.client_id(), task_id),
            );

            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(Some(task_id), start)),
                report = status_read => report,
            };

            let report = match report {
                Ok(report) => report,
                Err(TransportError::Timeout { .. }) if Instant::now() >= deadline => {
                    return Err(self.timed_out(task_id, start));
                }
                Err(e) => return Err(e.into()),
            };

            self.events.record(TaskEvent::Polled {
                task_id,
                attempt,
                code: report.code,
            });

            match progress.observe(&report) {
                Observation::Advanced { from, to } => {
                    self.events.record(TaskEvent::StatusChanged {
                        task_id,
                        from,
                        to,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Observation::Unchanged(_) => {}
                Observation::Regressed { current, reported } => {
                    self.events.record(TaskEvent::StatusRegressed {
                        task_id,
                        current,
                        reported,
                    });
                }
                Observation::Unrecognized(code) => {
                    self.events
                        .record(TaskEvent::UnknownStatus { task_id, code });
                }
            }

            match progress.current() {
                TaskStatus::Success => {
                    self.events.record(TaskEvent::Succeeded {
                        task_id,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                    return Ok(());
                }
                TaskStatus::Aborted => {
                    let reason = progress
                        .abort_reason()
                        .unwrap_or(UNKNOWN_ABORT_REASON)
                        .to_string();
                    self.events.record(TaskEvent::Aborted {
                        task_id,
                        reason: reason.clone(),
                    });
                    return Err(TaskError::Aborted { task_id, reason });
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(task_id, start));
            }

            let wake = (now + self.policy.interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(Some(task_id), start)),
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Download and decode the result of a task that reached `Success`.
    pub async fn fetch_result(&self, handle: &TaskHandle) -> Result<TaskResult, TaskError> {
        let task_id = handle.id();
        let mut body: Vec<u8> = Vec::new();
        let bytes = Self::bounded(
            "result",
            self.policy.request_timeout,
            self.transport
                .get_result(handle.client_id(), task_id, &mut body),
        )
        .await?;

        self.events
            .record(TaskEvent::ResultFetched { task_id, bytes });

        let decoded = match self.transport.result_route() {
            ResultRoute::Chat => {
                serde_json::from_slice::<Envelope<TaskResult>>(&body).map(|e| e.data)
            }
            ResultRoute::File => serde_json::from_slice::<TaskResult>(&body),
        };

        let result = decoded.map_err(|e| TaskError::MalformedResult {
            task_id,
            message: e.to_string(),
        })?;

        if result.choices.is_empty() {
            return Err(TaskError::MalformedResult {
                task_id,
                message: "result has no choices".to_string(),
            });
        }
        Ok(result)
    }

    /// Submit, wait and fetch; returns the first choice's content.
    pub async fn run_chat_task(
        &self,
        request: &TaskRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, TaskError> {
        let start = Instant::now();

        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled(None, start)),
            handle = self.submit(request) => handle?,
        };

        self.await_completion(&handle, timeout, cancel).await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled(Some(handle.id()), start)),
            result = self.fetch_result(&handle) => result?,
        };

        result
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| TaskError::MalformedResult {
                task_id: handle.id(),
                message: "result has no choices".to_string(),
            })
    }
}
