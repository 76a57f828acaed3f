use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::task::{GenerationConfig, Message, TaskClient, TaskRequest};

/// One conversation: in-memory history plus the settings each turn is sent with.
/// History is dropped with the session.
pub struct ChatSession {
    client: TaskClient,
    model: String,
    generation: GenerationConfig,
    seed: u64,
    timeout: Duration,
    history: Vec<(String, String)>,
}

impl ChatSession {
    pub fn new(
        client: TaskClient,
        model: impl Into<String>,
        generation: GenerationConfig,
        seed: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            generation,
            seed,
            timeout,
            history: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Completed (user, assistant) exchanges.
    pub fn history(&self) -> &[(String, String)] {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Request for the next turn: prior exchanges in order, then `message`.
    pub fn build_request(&self, message: &str) -> TaskRequest {
        let mut messages = Vec::with_capacity(self.history.len() * 2 + 1);
        for (user, assistant) in &self.history {
            messages.push(Message::user(user.as_str()));
            messages.push(Message::assistant(assistant.as_str()));
        }
        messages.push(Message::user(message));

        TaskRequest {
            model: self.model.clone(),
            messages,
            generation_config: self.generation.clone(),
            seed: self.seed,
        }
    }

    /// Send one user turn. History only grows when a reply comes back.
    pub async fn send(
        &mut self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, TaskError> {
        let request = self.build_request(message);
        let reply = self
            .client
            .run_chat_task(&request, self.timeout, cancel)
            .await?;
        self.history.push((message.to_string(), reply.clone()));
        Ok(reply)
    }
}
