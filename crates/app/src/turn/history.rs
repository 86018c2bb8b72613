use chrono::{DateTime, Utc};

use parlance_llm::HistoryTurn;

/// One user-utterance / agent-response exchange as recorded in the session.
#[derive(Debug, Clone)]
pub struct Turn {
    pub user_text: String,
    /// Partial when the turn was interrupted or the model stream died.
    pub assistant_text: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub interrupted: bool,
    /// The model stream ended in error with this much text produced.
    pub incomplete: bool,
    /// Retrieval degraded to zero contexts for this turn.
    pub retrieval_failed: bool,
}

/// Append-only conversation record. Earlier turns are never mutated.
#[derive(Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        // every recorded turn either heard the user or was cut off mid-answer
        debug_assert!(!turn.user_text.trim().is_empty() || turn.interrupted);
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Shape the record for prompt assembly.
    pub fn as_prompt_turns(&self) -> Vec<HistoryTurn> {
        self.turns
            .iter()
            .map(|t| HistoryTurn {
                user: t.user_text.clone(),
                assistant: t.assistant_text.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(user: &str, assistant: &str) -> Turn {
        let now = Utc::now();
        Turn {
            user_text: user.into(),
            assistant_text: assistant.into(),
            started_at: now,
            completed_at: now,
            interrupted: false,
            incomplete: false,
            retrieval_failed: false,
        }
    }

    #[test]
    fn history_is_append_only_in_order() {
        let mut history = ConversationHistory::new();
        history.push(turn("one", "1"));
        history.push(turn("two", "2"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].user_text, "one");
        let prompt = history.as_prompt_turns();
        assert_eq!(prompt[1].assistant, "2");
    }
}
