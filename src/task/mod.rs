pub mod client;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::transport::http::HttpTransport;

pub use client::{MIN_STATUS_WINDOW, PollPolicy, TaskClient};
pub use status::{Observation, StatusReport, TaskProgress, TaskStatus};

/// Bridge task kind for chat completion.
pub const CHAT_TASK_TYPE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters. Unset fields are left off the wire so the
/// server applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<f64>,
}

/// Immutable input of one chat-completion task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub generation_config: GenerationConfig,
    pub seed: u64,
}

impl TaskRequest {
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.model.trim().is_empty() {
            return Err(TaskError::InvalidRequest("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(TaskError::InvalidRequest(
                "at least one message is required".into(),
            ));
        }
        Ok(())
    }

    /// The `task_args` string the bridge expects: the request serialized
    /// to JSON and sent as a string value, not a nested object.
    pub fn task_args(&self) -> Result<String, TaskError> {
        serde_json::to_string(self)
            .map_err(|e| TaskError::InvalidRequest(format!("failed to serialize task args: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl TaskResult {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A task created on the bridge. The id is fixed once assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    id: u64,
    client_id: String,
}

impl TaskHandle {
    pub fn new(id: u64, client_id: impl Into<String>) -> Self {
        Self {
            id,
            client_id: client_id.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// One-shot helper: run a single chat task against `base_url` and
/// return the first choice's content.
pub async fn run_chat_task(
    base_url: &str,
    request: &TaskRequest,
    timeout: Duration,
) -> Result<String, TaskError> {
    let transport = HttpTransport::new(base_url)?;
    TaskClient::new(Arc::new(transport))
        .run_chat_task(request, timeout, &CancellationToken::new())
        .await
}
