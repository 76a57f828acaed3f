pub mod http;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWrite;

use crate::error::TransportError;
use crate::task::StatusReport;

/// Where the bridge serves a finished task's result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultRoute {
    /// `/gpt/{task_id}/result`: the result object inside the `data` envelope.
    #[default]
    Chat,
    /// `/{task_id}/images/0`: the result file's raw JSON bytes.
    File,
}

impl ResultRoute {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// `{"data": ...}` wrapper used by every bridge JSON response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// The three bridge calls a task goes through. Implementations do not retry.
#[async_trait]
pub trait TaskTransport: Send + Sync {
    /// Create a task and return its server-assigned id.
    async fn create_task(
        &self,
        client_id: &str,
        task_args: &str,
        task_type: u32,
    ) -> Result<u64, TransportError>;

    async fn get_status(
        &self,
        client_id: &str,
        task_id: u64,
    ) -> Result<StatusReport, TransportError>;

    /// Stream the result body into `sink`. Returns the number of bytes written.
    async fn get_result(
        &self,
        client_id: &str,
        task_id: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransportError>;

    fn result_route(&self) -> ResultRoute;
}
