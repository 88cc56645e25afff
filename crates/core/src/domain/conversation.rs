use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self { role, text: text.into(), timestamp: Utc::now() }
    }
}

/// Most specific delivery target recoverable from dialogue history.
///
/// Every field is optional; an all-empty context means the history did not
/// carry enough detail, which is a normal outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub location_code: Option<String>,
    pub level_type_code: Option<String>,
    pub canonical_url: Option<String>,
}

impl ConversationContext {
    pub fn is_empty(&self) -> bool {
        self.location_code.is_none()
            && self.level_type_code.is_none()
            && self.canonical_url.is_none()
    }
}
