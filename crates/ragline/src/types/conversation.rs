//! Conversation history types, consumed read-only by the prompt assembler

use serde::{Deserialize, Serialize};

/// Speaker role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The querying user
    User,
    /// The assistant's prior answers
    Assistant,
}

impl Role {
    /// Display label used in assembled prompts
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// A single prior turn of the surrounding session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke
    pub role: Role,
    /// What was said
    pub text: String,
    /// Chunk ids the assistant cited in this turn, if any
    #[serde(default)]
    pub cited_chunk_ids: Vec<String>,
}

impl ConversationTurn {
    /// A user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            cited_chunk_ids: Vec::new(),
        }
    }

    /// An assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            cited_chunk_ids: Vec::new(),
        }
    }
}
