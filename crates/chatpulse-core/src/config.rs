//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatPulseError, Result};

/// Top-level ChatPulse configuration, read from `~/.chatpulse/config.json` (JSON5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brief: Option<BriefConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant: Option<AssistantConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    4321
}

/// Automation client (headless browser) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Ceiling for leaving the initializing state, in seconds.
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,

    /// Browser profile directory; keeps the login across restarts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<String>,

    /// How often the page is probed for QR / ready / logout changes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_client_url")]
    pub url: String,

    /// Give up after this many distinct QR challenges (0 = never).
    #[serde(default)]
    pub qr_max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: default_init_timeout(),
            headless: true,
            chrome_path: None,
            profile_dir: None,
            poll_interval_ms: default_poll_interval(),
            url: default_client_url(),
            qr_max_retries: 0,
        }
    }
}

/// Upper bound accepted by [`Config::validate`] for `client.init_timeout_secs`.
pub const MAX_INIT_TIMEOUT_SECS: u64 = 86_400;

fn default_init_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_client_url() -> String {
    "https://web.whatsapp.com".into()
}

fn default_true() -> bool {
    true
}

impl ClientConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolve the browser profile directory (default: `~/.chatpulse/browser-profile`).
    pub fn resolve_profile_dir(&self) -> PathBuf {
        self.profile_dir
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
            .unwrap_or_else(|| data_dir().join("browser-profile"))
    }
}

/// OpenAI-compatible chat-completion provider used for the activity brief.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefConfig {
    #[serde(default = "default_brief_base_url")]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_brief_key_env", skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_brief_model")]
    pub model: String,

    #[serde(default = "default_brief_temperature")]
    pub temperature: f64,

    #[serde(default = "default_brief_max_tokens")]
    pub max_tokens: u32,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            base_url: default_brief_base_url(),
            api_key: None,
            api_key_env: default_brief_key_env(),
            model: default_brief_model(),
            temperature: default_brief_temperature(),
            max_tokens: default_brief_max_tokens(),
        }
    }
}

fn default_brief_base_url() -> String {
    "https://api.groq.com/openai".into()
}

fn default_brief_key_env() -> Option<String> {
    Some("GROQ_API_KEY".into())
}

fn default_brief_model() -> String {
    "llama-3.3-70b-versatile".into()
}

fn default_brief_temperature() -> f64 {
    0.1
}

fn default_brief_max_tokens() -> u32 {
    1000
}

impl BriefConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "chatpulse_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ChatPulseError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

/// Set `value` at a dotted `path` inside a JSON object, creating
/// intermediate objects as needed.
fn set_value_path(root: &mut serde_json::Value, path: &str, value: serde_json::Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(ChatPulseError::Config("Empty config path".into()));
    };

    let mut current = root;
    for segment in parents {
        let object = current
            .as_object_mut()
            .ok_or_else(|| ChatPulseError::Config(format!("Cannot descend into '{segment}'")))?;
        let entry = object
            .entry(segment.to_string())
            .or_insert_with(|| serde_json::json!({}));
        if !entry.is_object() {
            *entry = serde_json::json!({});
        }
        current = entry;
    }
    current
        .as_object_mut()
        .ok_or_else(|| ChatPulseError::Config("Config root must be an object".into()))?
        .insert(last.to_string(), value);
    Ok(())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        json5::from_str(&substituted)
            .map_err(|e| ChatPulseError::Config(e.to_string()))
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(default_port())
    }

    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    /// Client settings, falling back to defaults when the section is absent.
    pub fn client(&self) -> ClientConfig {
        self.client.clone().unwrap_or_default()
    }

    /// Brief settings, falling back to defaults when the section is absent.
    pub fn brief(&self) -> BriefConfig {
        self.brief.clone().unwrap_or_default()
    }

    /// Path of the assistant instructions file.
    pub fn instructions_path(&self) -> PathBuf {
        self.assistant
            .as_ref()
            .and_then(|a| a.instructions_path.as_ref())
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
            .unwrap_or_else(|| data_dir().join("assistant.json"))
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "client.headless").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set one value in the config file at `file`, creating the file when it
    /// is missing. Other entries keep their raw text, so `${VAR}` references
    /// stay unresolved on disk. JSON5 comments are not preserved.
    pub fn set_path_in_file(file: &Path, path: &str, value: serde_json::Value) -> Result<()> {
        let mut raw = if file.exists() {
            let text = std::fs::read_to_string(file)?;
            json5::from_str::<serde_json::Value>(&text)
                .map_err(|e| ChatPulseError::Config(format!("{}: {e}", file.display())))?
        } else {
            serde_json::json!({})
        };
        set_value_path(&mut raw, path, value)?;
        let text = serde_json::to_string_pretty(&raw)?;

        // Reject edits that no longer load.
        json5::from_str::<Config>(&substitute_env_vars(&text)?)
            .map_err(|e| ChatPulseError::Config(format!("Invalid value for '{path}': {e}")))?;

        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(file, text)?;
        Ok(())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.brief().resolve_api_key().is_none() {
            warnings.push("Brief provider has no API key configured; /api/whatsapp/brief is disabled".to_string());
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        if let Some(client) = &self.client {
            if client.init_timeout_secs == 0 {
                errors.push("client.init_timeout_secs must be greater than 0".to_string());
            } else if client.init_timeout_secs > MAX_INIT_TIMEOUT_SECS {
                errors.push(format!(
                    "client.init_timeout_secs must be at most {MAX_INIT_TIMEOUT_SECS} (one day)"
                ));
            }
            if client.poll_interval_ms == 0 {
                errors.push("client.poll_interval_ms must be greater than 0".to_string());
            }
            if let Some(chrome) = &client.chrome_path {
                if !Path::new(chrome).exists() {
                    errors.push(format!("Chrome executable not found: {chrome}"));
                }
            }
        }

        if let Some(logging) = &self.logging {
            if !matches!(logging.format.as_str(), "plain" | "json") {
                warnings.push(format!(
                    "Unknown logging.format '{}', falling back to plain",
                    logging.format
                ));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for ChatPulse data: `~/.chatpulse/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatpulse")
}
