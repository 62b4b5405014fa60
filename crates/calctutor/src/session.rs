//! The per-user conversation log.
//!
//! A [`Session`] is an ordered, append-only sequence of [`ChatTurn`]s. Only
//! two operations change it: [`append`](Session::append) and
//! [`reset`](Session::reset). Turns are never reordered, merged or
//! deduplicated.
//!
//! A fresh session may open with a greeting. The greeting is shown to the
//! user like any other assistant turn but is local-only:
//! [`upstream`](Session::upstream) leaves it out of the request history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered turn log for one user session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    turns: Vec<ChatTurn>,
    /// Whether `turns[0]` is the local-only greeting.
    greeted: bool,
}

impl Session {
    /// An empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose first turn is `greeting`.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatTurn::assistant(greeting)],
            greeted: true,
        }
    }

    pub fn append(&mut self, role: ChatRole, text: impl Into<String>) {
        self.turns.push(ChatTurn {
            role,
            text: text.into(),
        });
    }

    /// Clear every turn, including the greeting.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.greeted = false;
    }

    /// All turns in append order, greeting included.
    pub fn all(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// The turns that belong in a request transcript.
    pub fn upstream(&self) -> &[ChatTurn] {
        if self.greeted {
            &self.turns[1..]
        } else {
            &self.turns
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order_and_content() {
        let mut session = Session::new();
        let script = [
            (ChatRole::User, "1"),
            (ChatRole::Assistant, "Paso 1"),
            (ChatRole::User, "why?"),
            (ChatRole::User, "why?"),
            (ChatRole::Assistant, ""),
        ];
        for (role, text) in script {
            session.append(role, text);
        }

        let turns = session.all();
        assert_eq!(turns.len(), script.len());
        for (turn, (role, text)) in turns.iter().zip(script) {
            assert_eq!(turn.role, role);
            assert_eq!(turn.text, text);
        }
    }

    #[test]
    fn identical_turns_are_kept() {
        let mut session = Session::new();
        session.append(ChatRole::User, "same");
        session.append(ChatRole::User, "same");
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn reset_always_empties() {
        let mut session = Session::with_greeting("hola");
        session.append(ChatRole::User, "1");
        session.reset();
        assert!(session.all().is_empty());
        session.reset();
        assert!(session.all().is_empty());
        assert!(session.upstream().is_empty());
    }

    #[test]
    fn greeting_is_shown_but_not_sent() {
        let mut session = Session::with_greeting("hola");
        session.append(ChatRole::User, "1");

        assert_eq!(session.all()[0], ChatTurn::assistant("hola"));
        assert_eq!(session.upstream(), &[ChatTurn::user("1")]);
    }

    #[test]
    fn after_reset_every_turn_is_sent() {
        let mut session = Session::with_greeting("hola");
        session.reset();
        session.append(ChatRole::User, "2");
        assert_eq!(session.upstream(), session.all());
    }

    #[test]
    fn turn_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatTurn::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["text"], "hi");
    }
}
