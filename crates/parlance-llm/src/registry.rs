use std::collections::HashMap;
use std::sync::Arc;

use parlance_foundation::LlmError;

use crate::adapter::LlmAdapter;
use crate::mock::MockLlmAdapter;
use crate::openai_http::OpenAiLlmAdapter;

pub struct LlmRegistry {
    adapters: HashMap<&'static str, Arc<dyn LlmAdapter>>,
}

impl LlmRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(MockLlmAdapter::new()));
        registry.register(Arc::new(OpenAiLlmAdapter::new()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn LlmAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn LlmAdapter>, LlmError> {
        self.adapters
            .get(id)
            .cloned()
            .ok_or_else(|| LlmError::UnknownAdapter(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_registered() {
        let registry = LlmRegistry::with_defaults();
        assert!(registry.get("mock.llm").is_ok());
        assert!(registry.get("openai.llm").is_ok());
        assert!(matches!(registry.get("?"), Err(LlmError::UnknownAdapter(_))));
    }
}
