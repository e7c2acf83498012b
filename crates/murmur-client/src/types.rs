//! Conversation turns and the wire shapes of the three voice endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation. Immutable once created; ordering is
/// conversation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub message: &'a str,
    pub conversation_history: &'a [Turn],
}

#[derive(Deserialize)]
pub(crate) struct GenerateResponse {
    pub response: String,
}

/// The transcription endpoint has been observed answering with either a
/// `response` or a `text` key; the deployed backend's `response` shape is
/// canonical and wins when both are present.
#[derive(Deserialize)]
pub(crate) struct TranscribeResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl TranscribeResponse {
    pub fn into_text(self) -> Option<String> {
        self.response.or(self.text)
    }
}
