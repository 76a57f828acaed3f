//! Shared test doubles: an in-memory scripted bridge and a recording event sink.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crynux_chat::error::TransportError;
use crynux_chat::events::{EventSink, TaskEvent};
use crynux_chat::task::{StatusReport, TaskStatus};
use crynux_chat::transport::{ResultRoute, TaskTransport};

/// One scripted answer to a status read.
#[derive(Clone)]
pub enum StatusStep {
    Report(StatusReport),
    Fail(u16),
    /// Never answers. Sets the transport's `dropped_inflight` flag when abandoned.
    Hang,
}

pub fn code(status: TaskStatus) -> StatusStep {
    StatusStep::Report(StatusReport::new(status))
}

pub fn raw(code: i64) -> StatusStep {
    StatusStep::Report(StatusReport {
        code,
        abort_reason: None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create {
        client_id: String,
        task_args: String,
        task_type: u32,
    },
    Status {
        client_id: String,
        task_id: u64,
        at: Duration,
    },
    Result {
        client_id: String,
        task_id: u64,
    },
}

pub struct ScriptedTransport {
    task_id: Option<u64>,
    hang_create: bool,
    hang_result: bool,
    statuses: Mutex<VecDeque<StatusStep>>,
    result_body: Vec<u8>,
    route: ResultRoute,
    calls: Mutex<Vec<Call>>,
    start: Instant,
    pub dropped_inflight: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    /// Statuses are served in order; the last one repeats once the script runs out.
    pub fn new(task_id: u64, statuses: Vec<StatusStep>, result_body: impl Into<Vec<u8>>) -> Self {
        Self {
            task_id: Some(task_id),
            hang_create: false,
            hang_result: false,
            statuses: Mutex::new(statuses.into()),
            result_body: result_body.into(),
            route: ResultRoute::Chat,
            calls: Mutex::new(Vec::new()),
            start: Instant::now(),
            dropped_inflight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creation answers with a body that has no `data.id`.
    pub fn without_task_id(mut self) -> Self {
        self.task_id = None;
        self
    }

    /// Creation never answers.
    pub fn hanging_create(mut self) -> Self {
        self.hang_create = true;
        self
    }

    /// The result download never answers.
    pub fn hanging_result(mut self) -> Self {
        self.hang_result = true;
        self
    }

    pub fn with_route(mut self, route: ResultRoute) -> Self {
        self.route = route;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_times(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Status { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    pub fn result_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Result { .. }))
            .count()
    }

    /// Park forever, flagging `dropped_inflight` once the caller gives up.
    async fn hang(&self) {
        let _guard = DropFlag(self.dropped_inflight.clone());
        std::future::pending::<()>().await;
    }

    fn next_status(&self) -> Option<StatusStep> {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        }
    }
}

#[async_trait]
impl TaskTransport for ScriptedTransport {
    async fn create_task(
        &self,
        client_id: &str,
        task_args: &str,
        task_type: u32,
    ) -> Result<u64, TransportError> {
        self.calls.lock().unwrap().push(Call::Create {
            client_id: client_id.to_string(),
            task_args: task_args.to_string(),
            task_type,
        });
        if self.hang_create {
            self.hang().await;
        }
        self.task_id.ok_or_else(|| TransportError::Decode {
            op: "create",
            message: "missing field `id`".to_string(),
        })
    }

    async fn get_status(
        &self,
        client_id: &str,
        task_id: u64,
    ) -> Result<StatusReport, TransportError> {
        self.calls.lock().unwrap().push(Call::Status {
            client_id: client_id.to_string(),
            task_id,
            at: self.start.elapsed(),
        });

        match self.next_status() {
            Some(StatusStep::Report(report)) => Ok(report),
            Some(StatusStep::Fail(status)) => Err(TransportError::Status {
                op: "status",
                status,
                body: "unavailable".to_string(),
            }),
            Some(StatusStep::Hang) => {
                self.hang().await;
                unreachable!()
            }
            None => panic!("status script is empty"),
        }
    }

    async fn get_result(
        &self,
        client_id: &str,
        task_id: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransportError> {
        self.calls.lock().unwrap().push(Call::Result {
            client_id: client_id.to_string(),
            task_id,
        });
        if self.hang_result {
            self.hang().await;
        }
        // Two writes, to look like a chunked download.
        let (head, tail) = self.result_body.split_at(self.result_body.len() / 2);
        for part in [head, tail] {
            sink.write_all(part)
                .await
                .map_err(|source| TransportError::Io { op: "result", source })?;
        }
        Ok(self.result_body.len() as u64)
    }

    fn result_route(&self) -> ResultRoute {
        self.route
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: TaskEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn result_json(content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": "Qwen/Qwen2.5-7B-Instruct",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
    })
}

/// Result body as served by the chat route (inside the `data` envelope).
pub fn chat_result_body(content: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "data": result_json(content) })).unwrap()
}
