use thiserror::Error;

/// Failure talking to the bridge. Never retried by the transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{op} request failed: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{op} returned HTTP {status}: {body}")]
    Status {
        op: &'static str,
        status: u16,
        body: String,
    },

    #[error("{op} response could not be decoded: {message}")]
    Decode { op: &'static str, message: String },

    #[error("{op} response exceeded {limit} bytes")]
    TooLarge { op: &'static str, limit: usize },

    #[error("{op} request timed out after {after_ms}ms")]
    Timeout { op: &'static str, after_ms: u64 },

    #[error("{op} sink write failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Name of the logical operation that failed ("create", "status", "result").
    pub fn op(&self) -> &'static str {
        match self {
            Self::Request { op, .. }
            | Self::Status { op, .. }
            | Self::Decode { op, .. }
            | Self::TooLarge { op, .. }
            | Self::Timeout { op, .. }
            | Self::Io { op, .. } => *op,
        }
    }

    /// HTTP status code, when the bridge answered with a non-success response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("task {task_id} aborted: {reason}")]
    Aborted { task_id: u64, reason: String },

    #[error("task {task_id} timed out after {elapsed_ms}ms")]
    Timeout { task_id: u64, elapsed_ms: u64 },

    #[error("task cancelled after {elapsed_ms}ms")]
    Cancelled {
        task_id: Option<u64>,
        elapsed_ms: u64,
    },

    #[error("task {task_id} returned a malformed result: {message}")]
    MalformedResult { task_id: u64, message: String },

    #[error("invalid task request: {0}")]
    InvalidRequest(String),
}

impl TaskError {
    /// Server-assigned id of the task the error refers to, if one was created.
    pub fn task_id(&self) -> Option<u64> {
        match self {
            Self::Aborted { task_id, .. }
            | Self::Timeout { task_id, .. }
            | Self::MalformedResult { task_id, .. } => Some(*task_id),
            Self::Cancelled { task_id, .. } => *task_id,
            Self::Transport(_) | Self::InvalidRequest(_) => None,
        }
    }

    /// Produce a message fit for showing to the person chatting.
    /// Does not leak bridge URLs or upstream response bodies.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(e) => match e.http_status() {
                Some(status) => format!(
                    "the inference bridge rejected the {} request (HTTP {status})",
                    e.op()
                ),
                None => format!("could not reach the inference bridge ({} request)", e.op()),
            },
            Self::Aborted { reason, .. } => format!("task aborted: {reason}"),
            Self::Timeout { elapsed_ms, .. } => {
                format!("request timed out after {}", human_elapsed(*elapsed_ms))
            }
            Self::Cancelled { .. } => "request cancelled".to_string(),
            Self::MalformedResult { .. } => {
                "the inference network returned an unusable result".to_string()
            }
            Self::InvalidRequest(msg) => format!("invalid request: {msg}"),
        }
    }
}

/// "850ms", "2s", "2.5s".
fn human_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}
