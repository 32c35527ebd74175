//! Conversational session model.
//!
//! A session is a persistent multi-turn conversation scoped to one
//! (stage, run) pair. The system instruction is fixed at creation; retries
//! continue the same dialogue so the model keeps its own previous (failing)
//! code in context.

use serde::{Deserialize, Serialize};

use crate::stage::StageKind;

/// Represents the role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationRole {
    /// Turn sent by this pipeline.
    User,
    /// Turn produced by the model.
    Model,
}

/// A single turn in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ConversationRole,
    pub content: String,
    /// Timestamp when the turn was recorded (ISO 8601 format).
    pub timestamp: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::User,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::Model,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A persistent conversational context for one (stage, session-id) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub stage: StageKind,
    pub session_id: String,
    /// Fixed at creation; later `get_or_create` calls ignore differing
    /// instruction arguments.
    system_instruction: String,
    turns: Vec<ConversationTurn>,
}

impl Session {
    pub fn new(
        stage: StageKind,
        session_id: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            session_id: session_id.into(),
            system_instruction: system_instruction.into(),
            turns: Vec::new(),
        }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// The ordered turn history, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn record_user_turn(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    pub fn record_model_turn(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::model(content));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_accumulates_turns_in_order() {
        let mut session = Session::new(StageKind::Collection, "run-1", "instruction");
        session.record_user_turn("first");
        session.record_model_turn("reply");
        session.record_user_turn("second");

        let roles: Vec<_> = session.history().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                ConversationRole::User,
                ConversationRole::Model,
                ConversationRole::User
            ]
        );
        assert_eq!(session.history()[1].content, "reply");
    }
}
