//! # ic-provider
//!
//! Finite LLM provider registry for IronCurtain.
//!
//! The set of providers is known at compile time ([`ChatProvider`]); each
//! variant knows its host, endpoint, and key-injection style. There is no
//! runtime plugin loading — a new provider is a new enum variant.
//!
//! [`ChatApi`] is the minimal capability the rest of the system sees: one
//! blocking chat-completion call. The mediator and agent run it on a
//! blocking thread (`tokio::task::spawn_blocking`); tests substitute
//! scripted implementations.

mod chat;
mod error;
mod http;

pub use chat::{ChatApi, ChatMessage, ChatRequest, ChatResponse, ChatRole};
pub use error::ProviderError;
pub use http::HttpChatClient;

use serde::{Deserialize, Serialize};

/// The compile-time-known provider set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    Anthropic,
    OpenAi,
    Google,
}

impl ChatProvider {
    pub const ALL: [ChatProvider; 3] = [
        ChatProvider::Anthropic,
        ChatProvider::OpenAi,
        ChatProvider::Google,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChatProvider::Anthropic => "anthropic",
            ChatProvider::OpenAi => "openai",
            ChatProvider::Google => "google",
        }
    }

    /// API host the provider is reached on.
    pub fn host(&self) -> &'static str {
        match self {
            ChatProvider::Anthropic => "api.anthropic.com",
            ChatProvider::OpenAi => "api.openai.com",
            ChatProvider::Google => "generativelanguage.googleapis.com",
        }
    }

    /// Pick the provider a model id belongs to, by naming convention.
    pub fn for_model(model_id: &str) -> Option<ChatProvider> {
        if model_id.starts_with("claude") {
            Some(ChatProvider::Anthropic)
        } else if model_id.starts_with("gpt") || model_id.starts_with("o1") || model_id.starts_with("o3") {
            Some(ChatProvider::OpenAi)
        } else if model_id.starts_with("gemini") {
            Some(ChatProvider::Google)
        } else {
            None
        }
    }
}

/// Real API keys, one slot per provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub struct ProviderKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<String>,
}

impl ProviderKeys {
    pub fn get(&self, provider: ChatProvider) -> Option<&str> {
        match provider {
            ChatProvider::Anthropic => self.anthropic.as_deref(),
            ChatProvider::OpenAi => self.openai.as_deref(),
            ChatProvider::Google => self.google.as_deref(),
        }
    }
}
