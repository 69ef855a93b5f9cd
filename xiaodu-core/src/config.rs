//! Configuration types for the Xiaodu MCP server

use crate::error::{Result, XiaoduError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Local config file merged when present in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "xiaodu.toml";

/// Environment variable naming a JSON config file
pub const CONFIG_PATH_ENV: &str = "XIAODU_CONFIG_PATH";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct XiaoduConfig {
    /// MCP server configuration
    pub server: ServerConfig,

    /// Device cloud configuration
    pub cloud: CloudConfig,
}

/// MCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported in `initialize`
    pub name: String,

    /// Transport to serve on
    pub transport: TransportKind,

    /// Listen address for the network transports
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "xiaodu-mcp".to_string(),
            transport: TransportKind::Stdio,
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Sse,
    Http,
}

impl FromStr for TransportKind {
    type Err = XiaoduError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            "http" | "streamable-http" => Ok(TransportKind::Http),
            other => Err(XiaoduError::Configuration(format!("Invalid transport: {}", other))),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Http => "http",
        })
    }
}

/// Device cloud configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL of the device cloud API
    pub api_base: String,

    /// Credential used when the transport supplies none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Per-request HTTP timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Window for a camera capture to complete
    #[serde(with = "humantime_serde")]
    pub capture_timeout: Duration,

    /// Default resource push window when the caller gives none
    #[serde(with = "humantime_serde")]
    pub push_timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_base: "https://xiaodu.baidu.com/saiya/mcp".to_string(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
            capture_timeout: Duration::from_secs(30),
            push_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field("api_base", &self.api_base)
            .field("access_token", &self.access_token.as_ref().map(|_| "****"))
            .field("request_timeout", &self.request_timeout)
            .field("capture_timeout", &self.capture_timeout)
            .field("push_timeout", &self.push_timeout)
            .finish()
    }
}

impl XiaoduConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `xiaodu.toml` in the working directory
    /// 3. JSON file at `json_path`, or from `XIAODU_CONFIG_PATH`
    /// 4. `XIAODU_` environment overrides, nested with `__`
    ///    (`XIAODU_CLOUD__API_BASE`)
    /// 5. `ACCESS_TOKEN` as `cloud.access_token`
    ///
    /// # Errors
    ///
    /// Returns an error if a file is invalid, a `${NAME}` placeholder names an
    /// unset variable, or the merged configuration fails validation.
    pub fn load(json_path: Option<&Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Json, Serialized, Toml},
        };

        let mut figment = Figment::new()
            .merge(Serialized::defaults(XiaoduConfig::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE));

        let json_path = json_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
        if let Some(path) = json_path {
            figment = figment.merge(Json::string(&read_json_config(&path)?));
        }

        let config: XiaoduConfig = figment
            .merge(Env::prefixed("XIAODU_").split("__"))
            .merge(
                Env::raw()
                    .only(&["ACCESS_TOKEN"])
                    .map(|_| "cloud.access_token".into()),
            )
            .extract()
            .map_err(|e| XiaoduError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single TOML file, without environment
    /// overrides.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: XiaoduConfig = Figment::new()
            .merge(Serialized::defaults(XiaoduConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                XiaoduError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `cloud.api_base` is not an absolute http(s) URL or
    /// a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.cloud.api_base).map_err(|e| {
            XiaoduError::Configuration(format!("Invalid cloud.api_base {:?}: {}", self.cloud.api_base, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(XiaoduError::Configuration(format!(
                "cloud.api_base must be an http(s) URL, got {:?}",
                self.cloud.api_base
            )));
        }

        for (name, value) in [
            ("request_timeout", self.cloud.request_timeout),
            ("capture_timeout", self.cloud.capture_timeout),
            ("push_timeout", self.cloud.push_timeout),
        ] {
            if value.is_zero() {
                return Err(XiaoduError::Configuration(format!("cloud.{} must be non-zero", name)));
            }
        }

        Ok(())
    }
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("placeholder pattern")
});

fn read_json_config(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        XiaoduError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        XiaoduError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    let value = substitute_env(value, &|name| std::env::var(name).ok())?;
    Ok(value.to_string())
}

/// Replace `${NAME}` and `${NAME:-default}` in every string of a parsed JSON
/// document.
///
/// Runs after parsing, so substituted values can never change the document's
/// structure.
///
/// # Errors
///
/// Returns a Configuration error naming the first variable that is unset and
/// has no default.
pub fn substitute_env(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(substitute_str(&s, lookup)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| substitute_env(item, lookup))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, substitute_env(v, lookup)?)))
                .collect::<Result<_>>()?,
        ),
        other => other,
    })
}

fn substitute_str(s: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let mut missing = None;
    let replaced = PLACEHOLDER.replace_all(s, |caps: &Captures| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(XiaoduError::Configuration(format!(
            "Environment variable {} is not set",
            name
        ))),
        None => Ok(replaced.into_owned()),
    }
}
