//! Prompt assembly and history budgeting.

use crate::types::ChatMessage;

/// Cheap token estimate: four characters per token. Close enough for a
/// budget that only decides how many old turns to drop.
pub fn approx_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// One completed exchange as it enters the prompt.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub user: String,
    pub assistant: String,
}

/// Assemble the message list for one model call:
/// system prompt, retrieved contexts as a second system message, capped
/// history, then the current user message. Oldest turns are elided first
/// when the history exceeds the token budget.
pub fn build_prompt(
    system_prompt: &str,
    contexts: &[String],
    history: &[HistoryTurn],
    user_text: &str,
    history_token_budget: usize,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 3);
    messages.push(ChatMessage::system(system_prompt));

    if !contexts.is_empty() {
        let mut grounding = String::from(
            "Use the following retrieved context when it is relevant to the user's request:\n",
        );
        for (i, ctx) in contexts.iter().enumerate() {
            grounding.push_str(&format!("\n[{}] {}\n", i + 1, ctx));
        }
        messages.push(ChatMessage::system(grounding));
    }

    // Walk backwards so the newest turns survive the budget.
    let mut kept: Vec<&HistoryTurn> = Vec::new();
    let mut spent = 0;
    for turn in history.iter().rev() {
        let cost = approx_tokens(&turn.user) + approx_tokens(&turn.assistant);
        if spent + cost > history_token_budget {
            break;
        }
        spent += cost;
        kept.push(turn);
    }
    for turn in kept.into_iter().rev() {
        messages.push(ChatMessage::user(turn.user.clone()));
        messages.push(ChatMessage::assistant(turn.assistant.clone()));
    }

    messages.push(ChatMessage::user(user_text));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn turn(u: &str, a: &str) -> HistoryTurn {
        HistoryTurn {
            user: u.into(),
            assistant: a.into(),
        }
    }

    #[test]
    fn prompt_ordering() {
        let messages = build_prompt(
            "You are helpful.",
            &["ctx one".into()],
            &[turn("hi", "hello")],
            "what now?",
            1_000,
        );
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert!(messages[1].content.contains("ctx one"));
        assert_eq!(messages.last().unwrap().content, "what now?");
    }

    #[test]
    fn no_context_block_when_empty() {
        let messages = build_prompt("sys", &[], &[], "q", 1_000);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn oldest_turns_elided_first() {
        let history = vec![
            turn(&"a".repeat(400), &"b".repeat(400)),
            turn("recent question", "recent answer"),
        ];
        // budget fits only the recent turn (~200 tokens for the old one)
        let messages = build_prompt("sys", &[], &history, "q", 20);
        let bodies: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert!(bodies.contains(&"recent question"));
        assert!(!bodies.iter().any(|b| b.starts_with("aaaa")));
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(approx_tokens(""), 0);
        assert_eq!(approx_tokens("abc"), 1);
        assert_eq!(approx_tokens("abcde"), 2);
    }
}
