//! Entry types for the conversation journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    /// Conversation opened against a provider.
    Start { provider: String, model: String },
    User { text: String },
    /// Text the model produced alongside (or instead of) tool calls.
    Model { text: String },
    ToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// The turn ended without a model answer.
    Degraded { reason: String },
    End,
}

impl EntryKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::User { .. } => "user",
            Self::Model { .. } => "model",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Degraded { .. } => "degraded",
            Self::End => "end",
        }
    }
}

/// One journal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
}

impl Entry {
    pub fn new(conversation_id: ConversationId, kind: EntryKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn user(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self::new(conversation_id, EntryKind::User { text: text.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_tagged() {
        let kind = EntryKind::ToolResult {
            call_id: "c1".into(),
            name: "query".into(),
            content: "ok".into(),
            is_error: false,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "tool_result");
        assert_eq!(kind.name(), "tool_result");
    }

    #[test]
    fn conversation_id_parses_back() {
        let id = ConversationId::new();
        assert_eq!(id.to_string().parse::<ConversationId>().unwrap(), id);
    }
}
