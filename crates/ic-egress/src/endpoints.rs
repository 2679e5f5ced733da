// endpoints.rs — Provider allowlists, key injection, request rewriting.
//
// One ProviderEndpoints per reachable API host. The endpoint allowlist is
// (method, path-pattern) where `*` matches exactly one non-empty path
// segment — never zero, never a slash. Everything else about the request
// passes through untouched except the credential swap and, for rewrite
// endpoints, the JSON body rewrite.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;

/// One allowlisted endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRule {
    pub method: String,
    pub path: String,
}

impl EndpointRule {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
        }
    }

    /// Match one request line. `*` in the pattern matches exactly one
    /// `[^/]+` segment.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if !method.eq_ignore_ascii_case(&self.method) {
            return false;
        }
        let path = path.split('?').next().unwrap_or(path);
        let pattern_segments: Vec<&str> = self.path.split('/').collect();
        let path_segments: Vec<&str> = path.split('/').collect();
        if pattern_segments.len() != path_segments.len() {
            return false;
        }
        pattern_segments
            .iter()
            .zip(&path_segments)
            .all(|(pattern, segment)| {
                if *pattern == "*" {
                    !segment.is_empty()
                } else {
                    pattern == segment
                }
            })
    }
}

/// How the real credential is injected upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInjection {
    /// Set a named header (e.g. `x-api-key`).
    Header(String),
    /// Set `Authorization: Bearer <key>`.
    Bearer,
}

/// What, if anything, is rewritten in request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRewriter {
    /// Strip server-side tool entries from an Anthropic messages request:
    /// a tools[] entry survives only if its `type` is absent or "custom".
    AnthropicStripServerTools,
    /// Leave the body alone.
    PassThrough,
}

impl RequestRewriter {
    pub fn apply(&self, body: &mut Value) {
        match self {
            RequestRewriter::PassThrough => {}
            RequestRewriter::AnthropicStripServerTools => {
                if let Some(tools) = body.get_mut("tools").and_then(Value::as_array_mut) {
                    tools.retain(|tool| match tool.get("type") {
                        None => true,
                        Some(Value::String(kind)) => kind == "custom",
                        Some(_) => false,
                    });
                }
            }
        }
    }
}

/// Everything the proxy knows about one provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub name: &'static str,
    pub host: &'static str,
    pub allowed_endpoints: Vec<EndpointRule>,
    pub key_injection: KeyInjection,
    /// Fake sentinel keys start with this.
    pub fake_key_prefix: &'static str,
    /// Endpoints whose bodies go through the rewriter.
    pub rewrite_endpoints: Vec<EndpointRule>,
    pub rewriter: RequestRewriter,
}

impl ProviderEndpoints {
    pub fn endpoint_allowed(&self, method: &str, path: &str) -> bool {
        self.allowed_endpoints
            .iter()
            .any(|rule| rule.matches(method, path))
    }

    pub fn should_rewrite(&self, method: &str, path: &str) -> bool {
        self.rewrite_endpoints
            .iter()
            .any(|rule| rule.matches(method, path))
    }
}

/// The compile-time provider registry for the proxy.
pub fn builtin_providers() -> Vec<ProviderEndpoints> {
    vec![
        ProviderEndpoints {
            name: "anthropic",
            host: "api.anthropic.com",
            allowed_endpoints: vec![
                EndpointRule::new("POST", "/v1/messages"),
                EndpointRule::new("POST", "/v1/messages/count_tokens"),
                EndpointRule::new("GET", "/v1/models"),
                EndpointRule::new("GET", "/v1/models/*"),
            ],
            key_injection: KeyInjection::Header("x-api-key".to_string()),
            fake_key_prefix: "sk-ant-",
            rewrite_endpoints: vec![EndpointRule::new("POST", "/v1/messages")],
            rewriter: RequestRewriter::AnthropicStripServerTools,
        },
        ProviderEndpoints {
            name: "openai",
            host: "api.openai.com",
            allowed_endpoints: vec![
                EndpointRule::new("POST", "/v1/chat/completions"),
                EndpointRule::new("POST", "/v1/responses"),
                EndpointRule::new("GET", "/v1/models"),
                EndpointRule::new("GET", "/v1/models/*"),
            ],
            key_injection: KeyInjection::Bearer,
            fake_key_prefix: "sk-",
            rewrite_endpoints: Vec::new(),
            rewriter: RequestRewriter::PassThrough,
        },
        ProviderEndpoints {
            name: "google",
            host: "generativelanguage.googleapis.com",
            allowed_endpoints: vec![
                EndpointRule::new("POST", "/v1beta/models/*"),
                EndpointRule::new("GET", "/v1beta/models"),
            ],
            key_injection: KeyInjection::Header("x-goog-api-key".to_string()),
            fake_key_prefix: "AIza",
            rewrite_endpoints: Vec::new(),
            rewriter: RequestRewriter::PassThrough,
        },
    ]
}

/// The sentinel keys handed to the container, one per provider.
#[derive(Debug, Clone, Default)]
pub struct FakeKeys {
    keys: HashMap<String, String>,
}

impl FakeKeys {
    /// Generate a fresh sentinel per provider using the OS RNG.
    pub fn generate(providers: &[ProviderEndpoints]) -> Self {
        let mut keys = HashMap::new();
        for provider in providers {
            let suffix: String = OsRng
                .sample_iter(&Alphanumeric)
                .take(40)
                .map(char::from)
                .collect();
            keys.insert(
                provider.name.to_string(),
                format!("{}{}", provider.fake_key_prefix, suffix),
            );
        }
        Self { keys }
    }

    pub fn get(&self, provider: &str) -> Option<&str> {
        self.keys.get(provider).map(String::as_str)
    }
}
