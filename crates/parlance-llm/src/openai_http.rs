//! OpenAI-compatible chat-completions adapter (SSE streaming).
//!
//! Works against any endpoint speaking the `/chat/completions` wire shape,
//! which most hosted and self-hosted model servers do.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parlance_foundation::{AdapterConfig, AdapterConfigExt, LlmError};

use crate::adapter::{LlmAdapter, LlmTurn};
use crate::types::{FinishReason, LlmEvent, LlmRequest, Role};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

pub struct OpenAiLlmAdapter {
    client: reqwest::Client,
}

impl OpenAiLlmAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn body(config: &AdapterConfig, request: &LlmRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                let mut obj = json!({ "role": role, "content": m.content });
                if let Some(name) = &m.tool_name {
                    obj["name"] = json!(name);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": config.str_or("model", DEFAULT_MODEL),
            "messages": messages,
            "stream": true,
        });
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(request
                .tools
                .iter()
                .map(|t| json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                }))
                .collect::<Vec<_>>());
        }
        body
    }
}

impl Default for OpenAiLlmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmAdapter for OpenAiLlmAdapter {
    fn id(&self) -> &'static str {
        "openai.llm"
    }

    async fn stream(
        &self,
        config: &AdapterConfig,
        request: LlmRequest,
        events: mpsc::Sender<LlmEvent>,
        cancel: CancellationToken,
    ) -> Result<LlmTurn, LlmError> {
        let base_url = config.str_or("base_url", DEFAULT_BASE_URL).to_string();
        let api_key = match config.get("api_key").and_then(|v| v.as_str()) {
            Some(k) => k.to_string(),
            None => std::env::var("OPENAI_API_KEY")
                .map_err(|_| LlmError::RequestFailed("no api_key configured".into()))?,
        };
        let body = Self::body(config, &request);
        let client = self.client.clone();

        let task = tokio::spawn(async move {
            let response = tokio::select! {
                r = client
                    .post(format!("{base_url}/chat/completions"))
                    .bearer_auth(api_key)
                    .json(&body)
                    .send() => r,
                _ = cancel.cancelled() => {
                    let _ = events.send(LlmEvent::End(FinishReason::Cancelled)).await;
                    return;
                }
            };

            let response = match response {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    let status = r.status();
                    let _ = events
                        .send(LlmEvent::Failed {
                            transient: status.is_server_error(),
                            message: format!("provider returned {status}"),
                        })
                        .await;
                    return;
                }
                Err(err) => {
                    let _ = events
                        .send(LlmEvent::Failed {
                            transient: err.is_timeout() || err.is_connect(),
                            message: err.to_string(),
                        })
                        .await;
                    return;
                }
            };

            let mut stream = response.bytes_stream();
            let mut line_buf = String::new();
            // tool-call fragments arrive interleaved, keyed by index
            let mut tool_calls: BTreeMap<usize, (String, String)> = BTreeMap::new();

            loop {
                let chunk = tokio::select! {
                    c = stream.next() => c,
                    _ = cancel.cancelled() => {
                        let _ = events.send(LlmEvent::End(FinishReason::Cancelled)).await;
                        return;
                    }
                };

                let bytes = match chunk {
                    Some(Ok(b)) => b,
                    Some(Err(err)) => {
                        let _ = events
                            .send(LlmEvent::Failed {
                                transient: true,
                                message: format!("stream: {err}"),
                            })
                            .await;
                        return;
                    }
                    None => {
                        // server hung up without [DONE]
                        let _ = events.send(LlmEvent::End(FinishReason::Stop)).await;
                        return;
                    }
                };

                line_buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=pos).collect();
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        let _ = events.send(LlmEvent::End(FinishReason::Stop)).await;
                        return;
                    }
                    let parsed: StreamChunk = match serde_json::from_str(data) {
                        Ok(p) => p,
                        Err(err) => {
                            tracing::warn!(error = %err, "unparseable stream chunk");
                            continue;
                        }
                    };
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty()
                                && events.send(LlmEvent::Delta(content)).await.is_err()
                            {
                                return;
                            }
                        }
                        for tc in choice.delta.tool_calls.unwrap_or_default() {
                            let entry = tool_calls.entry(tc.index).or_default();
                            if let Some(f) = tc.function {
                                if let Some(name) = f.name {
                                    entry.0 = name;
                                }
                                if let Some(args) = f.arguments {
                                    entry.1.push_str(&args);
                                }
                            }
                        }
                        match choice.finish_reason.as_deref() {
                            Some("tool_calls") => {
                                for (_, (name, arguments)) in std::mem::take(&mut tool_calls) {
                                    let _ = events
                                        .send(LlmEvent::ToolCall { name, arguments })
                                        .await;
                                }
                                let _ = events.send(LlmEvent::End(FinishReason::ToolCalls)).await;
                                return;
                            }
                            Some("length") => {
                                let _ = events.send(LlmEvent::End(FinishReason::Length)).await;
                                return;
                            }
                            Some("stop") => {
                                let _ = events.send(LlmEvent::End(FinishReason::Stop)).await;
                                return;
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        Ok(LlmTurn::new(task))
    }
}
