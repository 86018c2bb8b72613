use serde::{Deserialize, Serialize};
use std::path::Path;

use parlance_foundation::{ConfigError, TimeoutConfig};
use parlance_vad::VadConfig;

use crate::agent::AgentConfig;
use crate::turn::sentence::AccumulatorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_addr: String,
    pub timeouts: TimeoutConfig,
    pub vad: VadConfig,
    pub accumulator: AccumulatorConfig,
    /// Conversation history budget for prompt assembly.
    pub history_token_budget: usize,
    pub prespeech_ms: u64,
    pub fallback_text: String,
    pub agents: Vec<AgentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8095".to_string(),
            timeouts: TimeoutConfig::default(),
            vad: VadConfig::default(),
            accumulator: AccumulatorConfig::default(),
            history_token_budget: 2_048,
            prespeech_ms: 500,
            fallback_text: "Désolé, je n'ai pas entendu. Pouvez-vous répéter ?".to_string(),
            agents: vec![AgentConfig::demo("default")],
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::Validation {
                field: "agents".into(),
                reason: "at least one agent is required".into(),
            });
        }
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: "agents.id".into(),
                    reason: "agent id must be non-empty".into(),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(ConfigError::Validation {
                field: "vad.threshold".into(),
                reason: "must be within [0, 1]".into(),
            });
        }
        Ok(())
    }

    pub fn engine_config(&self) -> crate::turn::EngineConfig {
        crate::turn::EngineConfig {
            timeouts: self.timeouts.clone(),
            vad: self.vad.clone(),
            accumulator: self.accumulator.clone(),
            history_token_budget: self.history_token_budget,
            prespeech_window: std::time::Duration::from_millis(self.prespeech_ms),
            fallback_text: self.fallback_text.clone(),
            resampler_quality: parlance_audio::ResamplerQuality::Balanced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn loads_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
listen_addr = "0.0.0.0:9000"
history_token_budget = 1024

[[agents]]
id = "support"
system_prompt = "You are the support voice."

[agents.llm]
adapter = "openai.llm"

[agents.llm.config]
model = "gpt-4o-mini"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.history_token_budget, 1024);
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].llm.adapter, "openai.llm");
        // defaulted capability falls back to the built-in
        assert_eq!(config.agents[0].stt.adapter, "mock.stt");
    }

    #[test]
    fn rejects_empty_agent_list() {
        let config = AppConfig {
            agents: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
