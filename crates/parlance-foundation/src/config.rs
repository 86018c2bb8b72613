use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Free-form adapter configuration.
///
/// Interpreted by the adapter that receives it; unknown keys are ignored.
pub type AdapterConfig = serde_json::Map<String, serde_json::Value>;

/// Convenience accessors over [`AdapterConfig`].
pub trait AdapterConfigExt {
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;
    fn u64_or(&self, key: &str, default: u64) -> u64;
    fn f64_or(&self, key: &str, default: f64) -> f64;
}

impl AdapterConfigExt for AdapterConfig {
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(|v| v.as_str()).unwrap_or(default)
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }
}

/// Scheduler timeout budget. All values configurable; defaults per the
/// turn-taking design.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wait for the final transcript after speech end.
    pub stt_final_ms: u64,
    /// Retrieval budget; past it the turn proceeds with zero contexts.
    pub retrieval_ms: u64,
    /// First LLM token after the request is opened.
    pub llm_first_token_ms: u64,
    /// First synthesized audio after the TTS stream is opened.
    pub tts_first_audio_ms: u64,
    /// Hard deadline for cancellation confirmations on barge-in.
    pub cancellation_ms: u64,
    /// Session teardown after this much time in `Idle`.
    pub session_idle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stt_final_ms: 2_000,
            retrieval_ms: 300,
            llm_first_token_ms: 5_000,
            tts_first_audio_ms: 5_000,
            cancellation_ms: 300,
            session_idle_ms: 600_000,
        }
    }
}

impl TimeoutConfig {
    pub fn stt_final(&self) -> Duration {
        Duration::from_millis(self.stt_final_ms)
    }
    pub fn retrieval(&self) -> Duration {
        Duration::from_millis(self.retrieval_ms)
    }
    pub fn llm_first_token(&self) -> Duration {
        Duration::from_millis(self.llm_first_token_ms)
    }
    pub fn tts_first_audio(&self) -> Duration {
        Duration::from_millis(self.tts_first_audio_ms)
    }
    pub fn cancellation(&self) -> Duration {
        Duration::from_millis(self.cancellation_ms)
    }
    pub fn session_idle(&self) -> Duration {
        Duration::from_millis(self.session_idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_config_accessors_fall_back() {
        let cfg: AdapterConfig = serde_json::from_str(r#"{"url": "ws://x", "port": 9}"#).unwrap();
        assert_eq!(cfg.str_or("url", "-"), "ws://x");
        assert_eq!(cfg.str_or("missing", "-"), "-");
        assert_eq!(cfg.u64_or("port", 0), 9);
        assert_eq!(cfg.u64_or("missing", 7), 7);
    }

    #[test]
    fn timeout_defaults_match_design() {
        let t = TimeoutConfig::default();
        assert_eq!(t.stt_final(), Duration::from_secs(2));
        assert_eq!(t.retrieval(), Duration::from_millis(300));
        assert_eq!(t.cancellation(), Duration::from_millis(300));
        assert_eq!(t.session_idle(), Duration::from_secs(600));
    }
}
