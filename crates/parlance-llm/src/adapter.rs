use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parlance_foundation::{AdapterConfig, LlmError};

use crate::types::{LlmEvent, LlmRequest};

/// A streaming language-model provider.
///
/// `stream` spawns the provider exchange as its own task and returns a
/// handle; all output travels through the event sender handed in by the
/// scheduler. Cancellation is cooperative through the token and must be
/// honored within 200 ms — implementations check it between network reads.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    async fn stream(
        &self,
        config: &AdapterConfig,
        request: LlmRequest,
        events: mpsc::Sender<LlmEvent>,
        cancel: CancellationToken,
    ) -> Result<LlmTurn, LlmError>;
}

/// Handle to one in-flight model exchange.
pub struct LlmTurn {
    task: JoinHandle<()>,
}

impl LlmTurn {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Hard stop, used after the cancellation deadline expires.
    pub fn abort(self) {
        self.task.abort();
    }
}
