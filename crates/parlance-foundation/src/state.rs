use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};

/// Turn-taking state of a session.
///
/// The turn engine is the only writer; everything else observes transitions
/// through the session's published event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No user speech, no agent response. VAD and the pre-speech buffer run.
    Idle,
    /// VAD fired speech-start; STT is open and receiving frames.
    Listening,
    /// Final transcript received; retrieval and the LLM are in flight.
    Thinking,
    /// TTS audio is streaming out; watching for barge-in.
    Speaking,
    /// Unrecoverable session fault; next stop is Closed.
    Error,
    /// Terminal.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Thinking => "thinking",
            SessionState::Speaking => "speaking",
            SessionState::Error => "error",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Single-owner state holder with transition validation.
///
/// Owned by the turn engine task; not shared, not locked.
#[derive(Debug)]
pub struct StateTracker {
    state: SessionState,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn current(&self) -> SessionState {
        self.state
    }

    /// Apply a transition, rejecting edges outside the turn-taking machine.
    pub fn transition(&mut self, to: SessionState) -> Result<SessionState, OrchestratorError> {
        use SessionState::*;

        let valid = matches!(
            (self.state, to),
            (Idle, Listening)
                | (Listening, Idle)
                | (Listening, Thinking)
                // stt/llm fatal paths speak the apology fallback
                | (Listening, Speaking)
                | (Thinking, Speaking)
                | (Thinking, Idle)
                // speech-start while the agent is thinking cancels the LLM
                | (Thinking, Listening)
                | (Speaking, Idle)
                // barge-in
                | (Speaking, Listening)
                | (Idle, Thinking)
                | (_, Error)
                | (_, Closed)
        );

        if !valid {
            return Err(OrchestratorError::IllegalTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        let from = self.state;
        tracing::debug!(%from, %to, "session state transition");
        self.state = to;
        Ok(from)
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_cycle() {
        let mut st = StateTracker::new();
        assert_eq!(st.current(), SessionState::Idle);
        st.transition(SessionState::Listening).unwrap();
        st.transition(SessionState::Thinking).unwrap();
        st.transition(SessionState::Speaking).unwrap();
        st.transition(SessionState::Idle).unwrap();
        assert_eq!(st.current(), SessionState::Idle);
    }

    #[test]
    fn barge_in_edge() {
        let mut st = StateTracker::new();
        st.transition(SessionState::Listening).unwrap();
        st.transition(SessionState::Thinking).unwrap();
        st.transition(SessionState::Speaking).unwrap();
        // user starts talking over the agent
        st.transition(SessionState::Listening).unwrap();
        assert_eq!(st.current(), SessionState::Listening);
    }

    #[test]
    fn rejects_edges_outside_the_machine() {
        let mut st = StateTracker::new();
        assert!(st.transition(SessionState::Speaking).is_err());
        st.transition(SessionState::Listening).unwrap();
        st.transition(SessionState::Thinking).unwrap();
        st.transition(SessionState::Idle).unwrap();
        assert!(st.transition(SessionState::Thinking).is_ok()); // text-mode entry
    }

    #[test]
    fn closed_is_reachable_from_anywhere() {
        for start in [SessionState::Idle, SessionState::Listening] {
            let mut st = StateTracker::new();
            if start == SessionState::Listening {
                st.transition(SessionState::Listening).unwrap();
            }
            st.transition(SessionState::Closed).unwrap();
            assert_eq!(st.current(), SessionState::Closed);
        }
    }
}
