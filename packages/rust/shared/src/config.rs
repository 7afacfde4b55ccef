//! Application configuration for orgenrich.
//!
//! Tunables and default paths live in `~/.orgenrich/orgenrich.toml`.
//! Credentials and endpoints come from the environment only, and environment
//! values override the file for paths and the model name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EnrichError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "orgenrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".orgenrich";

/// Environment variable names for the index side and path overrides.
pub const ENV_OS_URL: &str = "OS_URL";
pub const ENV_OS_USERNAME: &str = "OS_USERNAME";
pub const ENV_OS_PASSWORD: &str = "OS_PASSWORD";
pub const ENV_OS_CA_CERT: &str = "OS_CA_CERT";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_INPUT_PATH: &str = "INPUT_JSON_PATH";
pub const ENV_PROMPT_PATH: &str = "PROMPT_PATH";
pub const ENV_LOG_DIR: &str = "LOG_DIR";

/// Older names for the path overrides, read when the current name is unset.
pub const ENV_INPUT_PATH_FALLBACK: &str = "MEMBER_JSON_PATH";
pub const ENV_PROMPT_PATH_FALLBACK: &str = "PROMPT01_PATH";

// ---------------------------------------------------------------------------
// Config structs (matching orgenrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Search index settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// Default input, prompt, and log locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat model used for enrichment.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per record, first call included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in seconds; doubles after every failed attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Upper bound on a single backoff delay in seconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    2
}
fn default_backoff_cap() -> u64 {
    20
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Documents per bulk request before a flush is triggered.
    #[serde(default = "default_flush_docs")]
    pub flush_docs: usize,

    /// Bulk request timeout in seconds.
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            flush_docs: default_flush_docs(),
            timeout_secs: default_index_timeout(),
        }
    }
}

fn default_flush_docs() -> usize {
    50
}
fn default_index_timeout() -> u64 {
    180
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON array of organization records.
    #[serde(default = "default_input")]
    pub input: String,

    /// Prompt file with `SYSTEM:` / `USER:` sections.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Directory for per-run log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            prompt: default_prompt(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_input() -> String {
    "/apps/chamber/member_index.json".into()
}
fn default_prompt() -> String {
    "./Prompt01.txt".into()
}
fn default_log_dir() -> String {
    "/apps/chamber".into()
}

// ---------------------------------------------------------------------------
// Run settings (runtime, merged from config file + environment)
// ---------------------------------------------------------------------------

/// Fully resolved settings for one `run`.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub generation_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Full `_bulk` endpoint, e.g. `https://host:9200/companies/_bulk`.
    pub index_url: Url,
    pub index_username: String,
    pub index_password: String,
    /// PEM file with an extra trust anchor for the index endpoint.
    pub index_ca_cert: Option<PathBuf>,
    pub index_timeout: Duration,
    pub flush_docs: usize,
    pub input_path: PathBuf,
    pub prompt_path: PathBuf,
    pub log_dir: PathBuf,
}

impl RunSettings {
    /// Resolve settings from the process environment.
    pub fn from_env(config: &AppConfig) -> Result<Self> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Resolve settings using `lookup` for environment values.
    ///
    /// Blank values count as missing.
    pub fn resolve(config: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &str| {
            get(name).ok_or_else(|| {
                EnrichError::config(format!("missing required environment variable: {name}"))
            })
        };

        let gen_cfg = &config.generation;
        let api_key = require(&gen_cfg.api_key_env)?;
        let raw_url = require(ENV_OS_URL)?;
        let index_url = Url::parse(&raw_url).map_err(|e| {
            EnrichError::config(format!("{ENV_OS_URL} is not a valid URL ({raw_url}): {e}"))
        })?;
        let index_username = require(ENV_OS_USERNAME)?;
        let index_password = require(ENV_OS_PASSWORD)?;

        if config.index.flush_docs == 0 {
            return Err(EnrichError::config("index.flush_docs must be at least 1"));
        }
        if gen_cfg.max_attempts == 0 {
            return Err(EnrichError::config("generation.max_attempts must be at least 1"));
        }

        let (input_path, prompt_path) = source_paths(config, &get);

        Ok(Self {
            api_key,
            model: get(ENV_MODEL).unwrap_or_else(|| gen_cfg.model.clone()),
            base_url: get(ENV_BASE_URL).unwrap_or_else(|| gen_cfg.base_url.clone()),
            temperature: gen_cfg.temperature,
            generation_timeout: Duration::from_secs(gen_cfg.timeout_secs),
            max_attempts: gen_cfg.max_attempts,
            backoff_base: Duration::from_secs(gen_cfg.backoff_base_secs),
            backoff_cap: Duration::from_secs(gen_cfg.backoff_cap_secs),
            index_url,
            index_username,
            index_password,
            index_ca_cert: get(ENV_OS_CA_CERT).map(PathBuf::from),
            index_timeout: Duration::from_secs(config.index.timeout_secs),
            flush_docs: config.index.flush_docs,
            input_path,
            prompt_path,
            log_dir: get(ENV_LOG_DIR)
                .unwrap_or_else(|| config.paths.log_dir.clone())
                .into(),
        })
    }
}

/// Input and prompt locations without credentials, for commands that stay offline.
pub fn resolve_source_paths(config: &AppConfig) -> (PathBuf, PathBuf) {
    source_paths(config, |name| {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    })
}

fn source_paths(config: &AppConfig, get: impl Fn(&str) -> Option<String>) -> (PathBuf, PathBuf) {
    let input = get(ENV_INPUT_PATH)
        .or_else(|| get(ENV_INPUT_PATH_FALLBACK))
        .unwrap_or_else(|| config.paths.input.clone());
    let prompt = get(ENV_PROMPT_PATH)
        .or_else(|| get(ENV_PROMPT_PATH_FALLBACK))
        .unwrap_or_else(|| config.paths.prompt.clone());
    (input.into(), prompt.into())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.orgenrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnrichError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.orgenrich/orgenrich.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| EnrichError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnrichError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnrichError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnrichError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OS_URL", "https://search.local:9200/companies/_bulk"),
            ("OS_USERNAME", "admin"),
            ("OS_PASSWORD", "secret"),
        ])
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("flush_docs"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[generation]
model = "gpt-4o-mini"

[index]
flush_docs = 10
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(config.index.flush_docs, 10);
        assert_eq!(config.index.timeout_secs, 180);
        assert_eq!(config.paths.prompt, "./Prompt01.txt");
    }

    #[test]
    fn resolve_with_required_env() {
        let vars = full_env();
        let settings =
            RunSettings::resolve(&AppConfig::default(), |k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.index_url.path(), "/companies/_bulk");
        assert_eq!(settings.generation_timeout, Duration::from_secs(120));
        assert_eq!(settings.backoff_base, Duration::from_secs(2));
        assert_eq!(settings.backoff_cap, Duration::from_secs(20));
        assert!(settings.index_ca_cert.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut vars = full_env();
        vars.insert("OPENAI_MODEL".into(), "gpt-4.1".into());
        vars.insert("LOG_DIR".into(), "/tmp/orgenrich-logs".into());
        vars.insert("OS_CA_CERT".into(), "/etc/ssl/os-ca.pem".into());
        let settings =
            RunSettings::resolve(&AppConfig::default(), |k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.model, "gpt-4.1");
        assert_eq!(settings.log_dir, PathBuf::from("/tmp/orgenrich-logs"));
        assert_eq!(
            settings.index_ca_cert,
            Some(PathBuf::from("/etc/ssl/os-ca.pem"))
        );
    }

    #[test]
    fn older_path_variable_names_are_honoured() {
        let mut vars = full_env();
        vars.insert("MEMBER_JSON_PATH".into(), "/data/members.json".into());
        vars.insert("PROMPT01_PATH".into(), "/data/prompt.txt".into());
        let settings =
            RunSettings::resolve(&AppConfig::default(), |k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.input_path, PathBuf::from("/data/members.json"));
        assert_eq!(settings.prompt_path, PathBuf::from("/data/prompt.txt"));

        vars.insert("INPUT_JSON_PATH".into(), "/data/current.json".into());
        vars.insert("PROMPT_PATH".into(), " ".into());
        let settings =
            RunSettings::resolve(&AppConfig::default(), |k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.input_path, PathBuf::from("/data/current.json"));
        assert_eq!(settings.prompt_path, PathBuf::from("/data/prompt.txt"));
    }

    #[test]
    fn source_paths_default_to_file_config() {
        let (input, prompt) = source_paths(&AppConfig::default(), |_| None);
        assert_eq!(input, PathBuf::from("/apps/chamber/member_index.json"));
        assert_eq!(prompt, PathBuf::from("./Prompt01.txt"));
    }

    #[test]
    fn missing_variable_is_named() {
        let mut vars = full_env();
        vars.remove("OS_PASSWORD");
        let err = RunSettings::resolve(&AppConfig::default(), |k| vars.get(k).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("OS_PASSWORD"));
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let mut vars = full_env();
        vars.insert("OPENAI_API_KEY".into(), "   ".into());
        let err = RunSettings::resolve(&AppConfig::default(), |k| vars.get(k).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn invalid_index_url_rejected() {
        let mut vars = full_env();
        vars.insert("OS_URL".into(), "not a url".into());
        let err = RunSettings::resolve(&AppConfig::default(), |k| vars.get(k).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("OS_URL"));
    }
}
