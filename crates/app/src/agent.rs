//! Agent configuration and the immutable per-session snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use parlance_foundation::{AdapterConfig, OrchestratorError};
use parlance_llm::{LlmAdapter, LlmRegistry};
use parlance_stt::{SttAdapter, SttRegistry};
use parlance_tts::{TtsAdapter, TtsRegistry};

use crate::tools::{Tool, ToolRegistry};

/// Adapter choice for one capability: a registry id plus free-form
/// provider configuration (unknown keys ignored by adapters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSelection {
    pub adapter: String,
    #[serde(default)]
    pub config: AdapterConfig,
}

impl AdapterSelection {
    pub fn named(adapter: &str) -> Self {
        Self {
            adapter: adapter.to_string(),
            config: AdapterConfig::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub system_prompt: String,
    #[serde(default = "default_stt")]
    pub stt: AdapterSelection,
    #[serde(default = "default_llm")]
    pub llm: AdapterSelection,
    #[serde(default = "default_tts")]
    pub tts: AdapterSelection,
    /// Contexts requested per turn; absent disables retrieval entirely.
    #[serde(default)]
    pub retrieval_top_k: Option<usize>,
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_stt() -> AdapterSelection {
    AdapterSelection::named("mock.stt")
}
fn default_llm() -> AdapterSelection {
    AdapterSelection::named("mock.llm")
}
fn default_tts() -> AdapterSelection {
    AdapterSelection::named("echo.tts")
}

impl AgentConfig {
    pub fn demo(id: &str) -> Self {
        Self {
            id: id.to_string(),
            system_prompt: "You are a concise, friendly voice assistant. \
                            Answer in short spoken sentences."
                .to_string(),
            stt: default_stt(),
            llm: default_llm(),
            tts: default_tts(),
            retrieval_top_k: None,
            tools: Vec::new(),
        }
    }
}

/// Immutable snapshot captured at session start. Configuration changes made
/// afterwards take effect on the next session, never this one.
pub struct AgentSnapshot {
    pub id: String,
    pub system_prompt: String,
    pub stt: Arc<dyn SttAdapter>,
    pub stt_config: AdapterConfig,
    pub llm: Arc<dyn LlmAdapter>,
    pub llm_config: AdapterConfig,
    pub tts: Arc<dyn TtsAdapter>,
    pub tts_config: AdapterConfig,
    pub retrieval_top_k: Option<usize>,
    pub tools: Vec<Arc<dyn Tool>>,
}

/// Process-wide adapter registries, passed explicitly to session wiring.
pub struct Registries {
    pub stt: SttRegistry,
    pub llm: LlmRegistry,
    pub tts: TtsRegistry,
    pub tools: ToolRegistry,
}

impl Registries {
    pub fn with_defaults() -> Self {
        Self {
            stt: SttRegistry::with_defaults(),
            llm: LlmRegistry::with_defaults(),
            tts: TtsRegistry::with_defaults(),
            tools: ToolRegistry::with_defaults(),
        }
    }

    /// Resolve an agent configuration into a snapshot, failing on any
    /// unknown adapter or tool id.
    pub fn snapshot(&self, config: &AgentConfig) -> Result<AgentSnapshot, OrchestratorError> {
        let mut tools = Vec::with_capacity(config.tools.len());
        for name in &config.tools {
            let tool = self.tools.get(name).ok_or_else(|| {
                OrchestratorError::Fatal(format!("agent {}: unknown tool {}", config.id, name))
            })?;
            tools.push(tool);
        }

        Ok(AgentSnapshot {
            id: config.id.clone(),
            system_prompt: config.system_prompt.clone(),
            stt: self.stt.get(&config.stt.adapter)?,
            stt_config: config.stt.config.clone(),
            llm: self.llm.get(&config.llm.adapter)?,
            llm_config: config.llm.config.clone(),
            tts: self.tts.get(&config.tts.adapter)?,
            tts_config: config.tts.config.clone(),
            retrieval_top_k: config.retrieval_top_k,
            tools,
        })
    }
}

/// In-memory agent lookup. Persistence and CRUD live in the admin
/// subsystem; the orchestrator only reads.
pub struct AgentStore {
    agents: HashMap<String, AgentConfig>,
}

impl AgentStore {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Result<&AgentConfig, OrchestratorError> {
        self.agents
            .get(id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_resolves_default_adapters() {
        let registries = Registries::with_defaults();
        let snapshot = registries.snapshot(&AgentConfig::demo("a")).unwrap();
        assert_eq!(snapshot.stt.id(), "mock.stt");
        assert_eq!(snapshot.llm.id(), "mock.llm");
        assert_eq!(snapshot.tts.id(), "echo.tts");
        assert!(snapshot.tools.is_empty());
    }

    #[test]
    fn snapshot_rejects_unknown_adapter() {
        let registries = Registries::with_defaults();
        let mut cfg = AgentConfig::demo("a");
        cfg.llm = AdapterSelection::named("missing.llm");
        assert!(registries.snapshot(&cfg).is_err());
    }

    #[test]
    fn agent_store_lookup() {
        let store = AgentStore::new(vec![AgentConfig::demo("support")]);
        assert!(store.get("support").is_ok());
        assert!(matches!(
            store.get("sales"),
            Err(OrchestratorError::AgentNotFound(_))
        ));
    }
}
