use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    /// Tutor group ids known to attendance (case preserved, matched case-insensitively).
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub access: AccessConfig,
    /// Root of the record directories, relative to the config file.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub surveys: SurveyConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("no bot token configured for {0} mode")]
    MissingToken(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroSeconds(&'static str),
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parse YAML text after environment expansion.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: Self = serde_saphyr::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// A zero bridge timeout would fail every controller command, and a zero
    /// survey duration would close surveys as they open.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.timeout_seconds == 0 {
            return Err(ConfigError::ZeroSeconds("bridge.timeout_seconds"));
        }
        if self.surveys.default_duration_seconds == 0 {
            return Err(ConfigError::ZeroSeconds("surveys.default_duration_seconds"));
        }
        Ok(())
    }

    /// Data directory resolved against the config file location.
    pub fn data_dir(&self, config_path: &Path) -> PathBuf {
        let dir = self
            .data_dir
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_DATA_DIR));
        resolve_path(config_path, dir)
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

/// Default data directory (relative to config file).
pub const DEFAULT_DATA_DIR: &str = "data";

// ============================================================================
// BotConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub dev_token: Option<String>,
    /// Connect with `dev_token` instead of `token`.
    #[serde(default)]
    pub development_mode: bool,
    /// Guild the bot serves. The first guild the bot joined when absent.
    #[serde(default)]
    pub guild_id: Option<u64>,
    /// User the controller's synthetic actor stands in for.
    #[serde(default)]
    pub operator_user_id: Option<u64>,
}

impl BotConfig {
    /// Token for the configured mode. Empty strings count as missing.
    pub fn active_token(&self) -> Result<&str, ConfigError> {
        let (token, mode) = if self.development_mode {
            (&self.dev_token, "development")
        } else {
            (&self.token, "production")
        };
        token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken(mode))
    }
}

// ============================================================================
// AccessConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AccessConfig {
    /// Role name that marks a privileged actor.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
    /// Roles carried by the controller's synthetic actor.
    #[serde(default)]
    pub roles: Vec<AccessRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessRole {
    pub id: u64,
    pub name: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_role: default_admin_role(),
            roles: Vec::new(),
        }
    }
}

// ============================================================================
// BridgeConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_timeout")]
    pub timeout_seconds: u64,
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_bridge_timeout(),
        }
    }
}

// ============================================================================
// SurveyConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SurveyConfig {
    /// Duration used when a request does not give one.
    #[serde(default = "default_survey_duration")]
    pub default_duration_seconds: u64,
}

impl SurveyConfig {
    pub fn default_duration(&self) -> Duration {
        Duration::from_secs(self.default_duration_seconds)
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            default_duration_seconds: default_survey_duration(),
        }
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_admin_role() -> String {
    "Admin".to_string()
}

fn default_bridge_timeout() -> u64 {
    30
}

fn default_survey_duration() -> u64 {
    30
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in config text.
///
/// - `${VAR}` - required, errors if not set
/// - `${VAR:-default}` - falls back to `default` (which may be empty)
/// - `$$` - literal `$`
///
/// No nested expansion.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix('$') {
            result.push('$');
            rest = stripped;
        } else if let Some(reference) = after.strip_prefix('{') {
            let end = reference
                .find('}')
                .ok_or(ConfigError::UnclosedVarReference)?;
            result.push_str(&lookup_var(&reference[..end])?);
            rest = &reference[end + 1..];
        } else {
            result.push('$');
            rest = after;
        }
    }

    result.push_str(rest);
    Ok(result)
}

/// Resolve the body of a `${...}` reference.
fn lookup_var(reference: &str) -> Result<String, ConfigError> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}
