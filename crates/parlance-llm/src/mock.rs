//! Scripted in-process model for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parlance_foundation::{AdapterConfig, LlmError};

use crate::adapter::{LlmAdapter, LlmTurn};
use crate::types::{FinishReason, LlmEvent, LlmRequest};

#[derive(Debug, Clone)]
pub enum LlmStep {
    Delay(Duration),
    Delta(String),
    ToolCall { name: String, arguments: String },
    End(FinishReason),
    Fail { transient: bool, message: String },
}

/// Split a response into whitespace-preserving word deltas, the shape real
/// providers stream in.
pub fn word_deltas(text: &str) -> Vec<LlmStep> {
    let mut steps = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let cut = rest
            .char_indices()
            .skip(1)
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i + 1)
            .unwrap_or(rest.len());
        steps.push(LlmStep::Delta(rest[..cut].to_string()));
        rest = &rest[cut..];
    }
    steps.push(LlmStep::End(FinishReason::Stop));
    steps
}

/// Requests seen by the adapter, for assertions.
#[derive(Default)]
pub struct MockLlmProbe {
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmProbe {
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().last().cloned()
    }
}

pub struct MockLlmAdapter {
    /// Scripts consumed in order, one per `stream` call; the last one
    /// repeats. Lets a test script the initial call and the post-tool
    /// resumption differently.
    scripts: Mutex<Vec<Vec<LlmStep>>>,
    probe: Arc<MockLlmProbe>,
}

impl MockLlmAdapter {
    pub fn new() -> Self {
        Self::scripted(vec![word_deltas("ok")]).0
    }

    pub fn scripted(scripts: Vec<Vec<LlmStep>>) -> (Self, Arc<MockLlmProbe>) {
        let probe = Arc::new(MockLlmProbe::default());
        (
            Self {
                scripts: Mutex::new(scripts),
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl Default for MockLlmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn id(&self) -> &'static str {
        "mock.llm"
    }

    async fn stream(
        &self,
        _config: &AdapterConfig,
        request: LlmRequest,
        events: mpsc::Sender<LlmEvent>,
        cancel: CancellationToken,
    ) -> Result<LlmTurn, LlmError> {
        let script = {
            let mut scripts = self.scripts.lock();
            if scripts.len() > 1 {
                scripts.remove(0)
            } else {
                scripts
                    .first()
                    .cloned()
                    .unwrap_or_else(|| word_deltas("ok"))
            }
        };
        self.probe.requests.lock().push(request);

        let task = tokio::spawn(async move {
            for step in script {
                if cancel.is_cancelled() {
                    let _ = events.send(LlmEvent::End(FinishReason::Cancelled)).await;
                    return;
                }
                match step {
                    LlmStep::Delay(d) => {
                        tokio::select! {
                            _ = tokio::time::sleep(d) => {}
                            _ = cancel.cancelled() => {
                                let _ = events.send(LlmEvent::End(FinishReason::Cancelled)).await;
                                return;
                            }
                        }
                    }
                    LlmStep::Delta(text) => {
                        let _ = events.send(LlmEvent::Delta(text)).await;
                    }
                    LlmStep::ToolCall { name, arguments } => {
                        let _ = events.send(LlmEvent::ToolCall { name, arguments }).await;
                    }
                    LlmStep::End(reason) => {
                        let _ = events.send(LlmEvent::End(reason)).await;
                        return;
                    }
                    LlmStep::Fail { transient, message } => {
                        let _ = events.send(LlmEvent::Failed { transient, message }).await;
                        return;
                    }
                }
            }
            let _ = events.send(LlmEvent::End(FinishReason::Stop)).await;
        });

        Ok(LlmTurn::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[tokio::test]
    async fn streams_scripted_deltas() {
        let (adapter, probe) = MockLlmAdapter::scripted(vec![word_deltas("Bonjour tout le monde")]);
        let (tx, mut rx) = mpsc::channel(32);
        adapter
            .stream(
                &AdapterConfig::new(),
                LlmRequest::new(vec![ChatMessage::user("salut")]),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(ev) = rx.recv().await {
            match ev {
                LlmEvent::Delta(d) => text.push_str(&d),
                LlmEvent::End(FinishReason::Stop) => break,
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(text, "Bonjour tout le monde");
        assert_eq!(probe.request_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_is_honored_mid_script() {
        let (adapter, _probe) = MockLlmAdapter::scripted(vec![vec![
            LlmStep::Delta("first ".into()),
            LlmStep::Delay(Duration::from_secs(10)),
            LlmStep::Delta("never".into()),
        ]]);
        let (tx, mut rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        adapter
            .stream(
                &AdapterConfig::new(),
                LlmRequest::new(vec![]),
                tx,
                cancel.clone(),
            )
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(LlmEvent::Delta(_))));
        cancel.cancel();
        let got = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("cancellation confirmation within 200ms");
        assert!(matches!(got, Some(LlmEvent::End(FinishReason::Cancelled))));
    }
}
