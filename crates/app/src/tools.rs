//! Tools the model may invoke mid-turn.
//!
//! Execution belongs to the turn engine: the adapter only surfaces the
//! model's request, the engine runs the tool and resumes the model with the
//! result appended to the conversation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use parlance_foundation::LlmError;
use parlance_llm::ToolSpec;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn spec(&self) -> ToolSpec;

    /// `arguments` is the JSON object string produced by the model.
    async fn execute(&self, arguments: &str) -> Result<String, LlmError>;
}

/// Reports the current UTC time. Mostly a wiring check for the tool loop.
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &'static str {
        "current_time"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: "Returns the current date and time in UTC.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
            }),
        }
    }

    async fn execute(&self, _arguments: &str) -> Result<String, LlmError> {
        Ok(chrono::Utc::now().to_rfc3339())
    }
}

pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ClockTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clock_tool_answers() {
        let out = ClockTool.execute("{}").await.unwrap();
        assert!(out.contains('T'));
    }

    #[test]
    fn registry_lookup() {
        let registry = ToolRegistry::with_defaults();
        assert!(registry.get("current_time").is_some());
        assert!(registry.get("nope").is_none());
    }
}
