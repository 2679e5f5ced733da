// chat.rs — The minimal chat-completion capability.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Who said a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    /// System prompt, kept separate because providers inject it
    /// differently.
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// A chat-completion result with token accounting for the budget tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The one capability the rest of the system needs from an LLM.
///
/// Blocking: callers in async contexts run it via
/// `tokio::task::spawn_blocking`.
pub trait ChatApi: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scripted model for tests elsewhere in the workspace.
    struct Scripted(&'static str);

    impl ChatApi for Scripted {
        fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                text: self.0.to_string(),
                input_tokens: 1,
                output_tokens: 1,
            })
        }
    }

    #[test]
    fn trait_is_object_safe() {
        let api: Box<dyn ChatApi> = Box::new(Scripted("ok"));
        let response = api
            .complete(&ChatRequest {
                model: "test".to_string(),
                system: None,
                messages: vec![ChatMessage::user("hi")],
                max_tokens: 16,
            })
            .unwrap();
        assert_eq!(response.text, "ok");
    }
}
