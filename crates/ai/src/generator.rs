use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AiError;

/// Speaker of a chat message (OpenAI-compatible role tags).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// The generative-text capability invoked by pipeline stages.
///
/// This crate stays transport-agnostic: implementations (HTTP clients, test
/// doubles) live with their callers.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send the prompt messages and return the generated free text.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, AiError>;
}

#[async_trait::async_trait]
impl<G> TextGenerator for Arc<G>
where
    G: TextGenerator + ?Sized,
{
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        (**self).generate(messages).await
    }
}
