//! Append-only conversation log for a single call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The person on the phone.
    User,
    /// The voice agent.
    Agent,
}

impl Role {
    /// Parses a role name case-insensitively.
    ///
    /// Returns `None` for anything other than `user` or `agent`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }

    /// Capitalized label used when rendering the transcript.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Agent => "Agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One utterance reported by the agent platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: Role,
    pub text: String,
    /// Whether the platform marked this utterance as final.
    pub is_final: bool,
}

impl TranscriptTurn {
    pub fn new(role: Role, text: impl Into<String>, is_final: bool) -> Self {
        Self {
            role,
            text: text.into(),
            is_final,
        }
    }

    /// Renders the turn as a single `"Role: text\n"` line.
    pub fn render(&self) -> String {
        format!("{}: {}\n", self.role, self.text)
    }
}

/// Ordered log of every turn observed on a call.
///
/// Turns can only be appended; there is no API to remove or reorder them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<TranscriptTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: TranscriptTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Concatenates every turn in arrival order.
    pub fn render(&self) -> String {
        self.turns.iter().map(TranscriptTurn::render).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_normalizes_case() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("AGENT"), Some(Role::Agent));
        assert_eq!(Role::parse(" Agent "), Some(Role::Agent));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn transcript_renders_turns_in_order() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptTurn::new(Role::User, "Hello?", true));
        transcript.push(TranscriptTurn::new(Role::Agent, "Hi, how can I help?", false));
        transcript.push(TranscriptTurn::new(Role::User, "Pricing please", true));

        assert_eq!(transcript.len(), 3);
        assert_eq!(
            transcript.render(),
            "User: Hello?\nAgent: Hi, how can I help?\nUser: Pricing please\n"
        );
    }

    #[test]
    fn empty_transcript_renders_empty_string() {
        let transcript = Transcript::default();
        assert!(transcript.is_empty());
        assert_eq!(transcript.render(), "");
    }
}
