use std::collections::HashMap;
use std::sync::Arc;

use parlance_foundation::TtsError;

use crate::adapter::TtsAdapter;
use crate::http::HttpTtsAdapter;
use crate::mock::EchoTtsAdapter;

pub struct TtsRegistry {
    adapters: HashMap<&'static str, Arc<dyn TtsAdapter>>,
}

impl TtsRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(EchoTtsAdapter));
        registry.register(Arc::new(HttpTtsAdapter::new()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn TtsAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn TtsAdapter>, TtsError> {
        self.adapters
            .get(id)
            .cloned()
            .ok_or_else(|| TtsError::UnknownAdapter(id.to_string()))
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
        let registry = TtsRegistry::with_defaults();
        assert!(registry.get("echo.tts").is_ok());
        assert!(registry.get("http.tts").is_ok());
        assert!(matches!(registry.get("?"), Err(TtsError::UnknownAdapter(_))));
    }
}
