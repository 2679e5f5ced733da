// http.rs — HTTP chat clients for the known providers.
//
// One blocking reqwest client per HttpChatClient; request/response bodies
// are provider-specific structs kept private to this module. Key material
// only ever appears in request headers, never in logs or errors.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::chat::{ChatApi, ChatRequest, ChatResponse, ChatRole};
use crate::error::ProviderError;
use crate::ChatProvider;

/// A blocking chat client bound to one provider and one API key.
pub struct HttpChatClient {
    provider: ChatProvider,
    api_key: String,
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpChatClient {
    pub fn new(
        provider: ChatProvider,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            provider,
            api_key: api_key.into(),
            base_url: format!("https://{}", provider.host()),
            client,
        })
    }

    /// Override the base URL (tests, or routing through the egress proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn complete_anthropic(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        #[derive(Deserialize)]
        struct Usage {
            input_tokens: u64,
            output_tokens: u64,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            text: String,
        }
        #[derive(Deserialize)]
        struct Response {
            content: Vec<Block>,
            usage: Usage,
        }

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role { ChatRole::User => "user", ChatRole::Assistant => "assistant" },
                    "content": m.content,
                })
            })
            .collect();
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()?;
        let response = check_status(response)?;
        let parsed: Response = response.json()?;

        let text = parsed
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        Ok(ChatResponse {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }

    fn complete_openai(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        #[derive(Deserialize)]
        struct Usage {
            prompt_tokens: u64,
            completion_tokens: u64,
        }
        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
            usage: Usage,
        }

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.push(json!({
                "role": match m.role { ChatRole::User => "user", ChatRole::Assistant => "assistant" },
                "content": m.content,
            }));
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": request.model,
                "max_tokens": request.max_tokens,
                "messages": messages,
            }))
            .send()?;
        let response = check_status(response)?;
        let parsed: Response = response.json()?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::UnexpectedResponse("no choices in response".into()))?;
        Ok(ChatResponse {
            text,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        })
    }

    fn complete_google(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Usage {
            #[serde(default)]
            prompt_token_count: u64,
            #[serde(default)]
            candidates_token_count: u64,
        }
        #[derive(Deserialize)]
        struct Part {
            #[serde(default)]
            text: String,
        }
        #[derive(Deserialize)]
        struct Content {
            #[serde(default)]
            parts: Vec<Part>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            #[serde(default)]
            candidates: Vec<Candidate>,
            usage_metadata: Option<Usage>,
        }

        let mut contents = Vec::new();
        for m in &request.messages {
            contents.push(json!({
                "role": match m.role { ChatRole::User => "user", ChatRole::Assistant => "model" },
                "parts": [{"text": m.content}],
            }));
        }
        let mut body = json!({"contents": contents});
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, request.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()?;
        let response = check_status(response)?;
        let parsed: Response = response.json()?;

        let text = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ProviderError::UnexpectedResponse("no candidates in response".into()))?;
        let usage = parsed.usage_metadata.unwrap_or(Usage {
            prompt_token_count: 0,
            candidates_token_count: 0,
        });
        Ok(ChatResponse {
            text,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }
}

impl ChatApi for HttpChatClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        match self.provider {
            ChatProvider::Anthropic => self.complete_anthropic(request),
            ChatProvider::OpenAi => self.complete_openai(request),
            ChatProvider::Google => self.complete_google(request),
        }
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        // Bodies of failed auth calls can echo headers; truncate hard.
        body: body.chars().take(300).collect(),
    })
}
