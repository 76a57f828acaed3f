use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;
use crate::task::StatusReport;
use crate::transport::{Envelope, ResultRoute, TaskTransport};

/// Default cap on a result body (4MB).
pub const DEFAULT_MAX_RESULT_BYTES: usize = 4 * 1024 * 1024;

/// Max bytes of an error body kept for diagnostics.
const ERROR_BODY_PREVIEW_BYTES: usize = 512;

/// Max bytes accepted for create/status responses.
const MAX_CONTROL_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct CreatedTask {
    id: u64,
}

#[derive(Deserialize)]
struct TaskStatusData {
    status: i64,
    #[serde(default)]
    abort_reason: Option<String>,
}

/// reqwest-backed transport for the bridge's `/v1/inference_tasks` API.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    result_route: ResultRoute,
    max_result_bytes: usize,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|source| TransportError::Request {
                op: "client",
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            result_route: ResultRoute::default(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        })
    }

    pub fn with_result_route(mut self, route: ResultRoute) -> Self {
        self.result_route = route;
        self
    }

    pub fn with_max_result_bytes(mut self, limit: usize) -> Self {
        self.max_result_bytes = limit;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn tasks_url(&self) -> String {
        format!("{}/v1/inference_tasks", self.base_url)
    }

    fn status_url(&self, client_id: &str, task_id: u64) -> String {
        format!("{}/v1/inference_tasks/{client_id}/{task_id}", self.base_url)
    }

    fn result_url(&self, client_id: &str, task_id: u64) -> String {
        match self.result_route {
            ResultRoute::Chat => format!(
                "{}/v1/inference_tasks/{client_id}/gpt/{task_id}/result",
                self.base_url
            ),
            ResultRoute::File => format!(
                "{}/v1/inference_tasks/{client_id}/{task_id}/images/0",
                self.base_url
            ),
        }
    }
}

/// Map non-2xx responses to `TransportError::Status`, keeping a short body preview.
async fn check_status(op: &'static str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_bytes = response.bytes().await.unwrap_or_default();
    let truncated = &error_bytes[..error_bytes.len().min(ERROR_BODY_PREVIEW_BYTES)];
    Err(TransportError::Status {
        op,
        status: status.as_u16(),
        body: String::from_utf8_lossy(truncated).into_owned(),
    })
}

/// Stream `response` into `sink`, failing once more than `limit` bytes
/// arrive. Nothing past the limit is buffered.
async fn copy_capped(
    op: &'static str,
    response: Response,
    limit: usize,
    sink: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<usize, TransportError> {
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(TransportError::TooLarge { op, limit });
    }

    let mut written: usize = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| TransportError::Request { op, source })?;
        if written + chunk.len() > limit {
            return Err(TransportError::TooLarge { op, limit });
        }
        sink.write_all(&chunk)
            .await
            .map_err(|source| TransportError::Io { op, source })?;
        written += chunk.len();
    }
    sink.flush()
        .await
        .map_err(|source| TransportError::Io { op, source })?;
    Ok(written)
}

/// Read a small JSON response and unwrap its `data` envelope.
async fn read_envelope<T: DeserializeOwned>(
    op: &'static str,
    response: Response,
) -> Result<T, TransportError> {
    let response = check_status(op, response).await?;
    let mut bytes: Vec<u8> = Vec::new();
    copy_capped(op, response, MAX_CONTROL_RESPONSE_BYTES, &mut bytes).await?;

    serde_json::from_slice::<Envelope<T>>(&bytes)
        .map(|envelope| envelope.data)
        .map_err(|e| TransportError::Decode {
            op,
            message: e.to_string(),
        })
}

#[async_trait]
impl TaskTransport for HttpTransport {
    async fn create_task(
        &self,
        client_id: &str,
        task_args: &str,
        task_type: u32,
    ) -> Result<u64, TransportError> {
        let body = serde_json::json!({
            "client_id": client_id,
            "task_args": task_args,
            "task_type": task_type,
        });

        let response = self
            .client
            .post(self.tasks_url())
            .json(&body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                op: "create",
                source,
            })?;

        let created: CreatedTask = read_envelope("create", response).await?;
        Ok(created.id)
    }

    async fn get_status(
        &self,
        client_id: &str,
        task_id: u64,
    ) -> Result<StatusReport, TransportError> {
        let response = self
            .client
            .get(self.status_url(client_id, task_id))
            .send()
            .await
            .map_err(|source| TransportError::Request {
                op: "status",
                source,
            })?;

        let data: TaskStatusData = read_envelope("status", response).await?;
        Ok(StatusReport {
            code: data.status,
            abort_reason: data.abort_reason,
        })
    }

    async fn get_result(
        &self,
        client_id: &str,
        task_id: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransportError> {
        const OP: &str = "result";

        let response = self
            .client
            .get(self.result_url(client_id, task_id))
            .send()
            .await
            .map_err(|source| TransportError::Request { op: OP, source })?;
        let response = check_status(OP, response).await?;

        let written = copy_capped(OP, response, self.max_result_bytes, sink).await?;

        tracing::debug!(task_id, bytes = written, "result body received");
        Ok(written as u64)
    }

    fn result_route(&self) -> ResultRoute {
        self.result_route
    }
}
