// config.rs — User configuration and the boot path.
//
// config.json is the operator's file; unknown keys warn instead of
// failing so older and newer builds can share a config. Recognized
// environment variables override file values. Both are read exactly once,
// in `boot_settings`, and the resulting Settings value is immutable.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ic_agent::ResourceBudget;
use ic_provider::ProviderKeys;

use crate::error::SessionError;

const MIN_ESCALATION_TIMEOUT: u64 = 30;
const MAX_ESCALATION_TIMEOUT: u64 = 600;

/// Auto-approver opt-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoApproveConfig {
    pub enabled: bool,
    pub model_id: Option<String>,
}

/// Whether out-of-sandbox activity warns or is enforced.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SandboxPolicy {
    Warn,
    #[default]
    Enforce,
}

/// The operator's config.json.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    pub agent_model_id: String,
    pub policy_model_id: String,
    pub provider_api_keys: ProviderKeys,
    /// Clamped to 30..600 on load.
    pub escalation_timeout_seconds: u64,
    pub resource_budget: ResourceBudget,
    pub auto_approve: AutoApproveConfig,
    pub auto_compact: bool,
    /// Credentials forwarded to downstream servers' environments.
    pub server_credentials: HashMap<String, String>,
    /// Anything this build does not know. Warned about, then ignored.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub unknown: BTreeMap<String, serde_json::Value>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            agent_model_id: "claude-sonnet-4-5".to_string(),
            policy_model_id: "claude-haiku-4-5".to_string(),
            provider_api_keys: ProviderKeys::default(),
            escalation_timeout_seconds: 120,
            resource_budget: ResourceBudget::default(),
            auto_approve: AutoApproveConfig::default(),
            auto_compact: true,
            server_credentials: HashMap::new(),
            unknown: BTreeMap::new(),
        }
    }
}

impl UserConfig {
    /// Load config.json. A missing file is the default config.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SessionError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut config: UserConfig =
            serde_json::from_str(&raw).map_err(|source| SessionError::MalformedConfig {
                path: path.to_path_buf(),
                source,
            })?;

        for key in config.unknown.keys() {
            tracing::warn!(key = %key, "unknown config key ignored");
        }
        config.escalation_timeout_seconds = config
            .escalation_timeout_seconds
            .clamp(MIN_ESCALATION_TIMEOUT, MAX_ESCALATION_TIMEOUT);
        Ok(config)
    }
}

/// Everything assembled by the boot path. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    /// $IRONCURTAIN_HOME.
    pub home: PathBuf,
    pub user: UserConfig,
    /// ALLOWED_DIRECTORY: an extra permitted root for downstream servers.
    pub allowed_directory: Option<PathBuf>,
    /// AUDIT_LOG_PATH override.
    pub audit_log_path: Option<PathBuf>,
    /// ESCALATION_DIR override.
    pub escalation_dir: Option<PathBuf>,
    pub sandbox_policy: SandboxPolicy,
}

/// Read the environment and config.json once.
pub fn boot_settings() -> Result<Settings, SessionError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    settings_from(&env)
}

/// The testable core of `boot_settings`: everything derived from an
/// explicit environment map.
pub(crate) fn settings_from(env: &HashMap<String, String>) -> Result<Settings, SessionError> {
    let home = env
        .get("IRONCURTAIN_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".ironcurtain")))
        .unwrap_or_else(|| PathBuf::from(".ironcurtain"));

    let mut user = UserConfig::load(&home.join("config.json"))?;

    if let Some(seconds) = env
        .get("ESCALATION_TIMEOUT_SECONDS")
        .and_then(|v| v.parse::<u64>().ok())
    {
        user.escalation_timeout_seconds =
            seconds.clamp(MIN_ESCALATION_TIMEOUT, MAX_ESCALATION_TIMEOUT);
    }
    if let Some(enabled) = env.get("AUTO_APPROVE_ENABLED") {
        user.auto_approve.enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
    }
    if let Some(model) = env.get("AUTO_APPROVE_MODEL_ID") {
        user.auto_approve.model_id = Some(model.clone());
    }
    if let Some(key) = env.get("ANTHROPIC_API_KEY") {
        user.provider_api_keys.anthropic = Some(key.clone());
    }
    if let Some(key) = env.get("OPENAI_API_KEY") {
        user.provider_api_keys.openai = Some(key.clone());
    }
    if let Some(key) = env.get("GOOGLE_API_KEY") {
        user.provider_api_keys.google = Some(key.clone());
    }

    let sandbox_policy = match env.get("SANDBOX_POLICY").map(String::as_str) {
        Some("warn") => SandboxPolicy::Warn,
        Some("enforce") | None => SandboxPolicy::Enforce,
        Some(other) => {
            tracing::warn!(value = other, "unknown SANDBOX_POLICY, using enforce");
            SandboxPolicy::Enforce
        }
    };

    Ok(Settings {
        home,
        user,
        allowed_directory: env.get("ALLOWED_DIRECTORY").map(PathBuf::from),
        audit_log_path: env.get("AUDIT_LOG_PATH").map(PathBuf::from),
        escalation_dir: env.get("ESCALATION_DIR").map(PathBuf::from),
        sandbox_policy,
    })
}
