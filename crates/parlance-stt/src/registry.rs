use std::collections::HashMap;
use std::sync::Arc;

use parlance_foundation::SttError;

use crate::adapter::SttAdapter;
use crate::mock::MockSttAdapter;
use crate::websocket::WsSttAdapter;

/// Adapter lookup by stable string identifier.
pub struct SttRegistry {
    adapters: HashMap<&'static str, Arc<dyn SttAdapter>>,
}

impl SttRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with the built-in adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(MockSttAdapter::new()));
        registry.register(Arc::new(WsSttAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SttAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn SttAdapter>, SttError> {
        self.adapters
            .get(id)
            .cloned()
            .ok_or_else(|| SttError::UnknownAdapter(id.to_string()))
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
        let registry = SttRegistry::with_defaults();
        assert!(registry.get("mock.stt").is_ok());
        assert!(registry.get("websocket.stt").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(SttError::UnknownAdapter(_))
        ));
    }
}
