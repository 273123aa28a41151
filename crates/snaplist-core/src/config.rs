// Configuration loading and parsing (assistant.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_HISTORY_TURNS: usize = 20;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 45;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_history_turns() -> usize {
    DEFAULT_HISTORY_TURNS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub backend: BackendConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// assistant.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire assistant.toml file.
#[derive(Debug, Clone, Deserialize)]
struct AssistantFile {
    llm: LlmConfig,
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    backend: BackendConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_max_tokens")]
    pub extraction_max_tokens: u32,
    #[serde(default = "default_max_tokens")]
    pub chat_max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Most recent transcript turns sent upstream with each chat message.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_turns: DEFAULT_HISTORY_TURNS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Remote listing backend. Publishing is unavailable when `url` is unset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub anthropic_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/assistant.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; see [`load_config`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- assistant.toml (required) ---
    let assistant_path = config_dir.join("assistant.toml");
    let assistant_text = read_file(&assistant_path)?;
    let assistant: AssistantFile =
        toml::from_str(&assistant_text).map_err(|e| ConfigError::ParseError {
            path: assistant_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        llm: assistant.llm,
        session: assistant.session,
        backend: assistant.backend,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Never overwrite a user's edited config.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Loads config relative to the current working directory, copying missing
/// files from `defaults/` first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.llm.model.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "llm.model".into(),
            message: "must not be empty".into(),
        });
    }

    let token_fields: &[(&str, u32)] = &[
        ("llm.extraction_max_tokens", config.llm.extraction_max_tokens),
        ("llm.chat_max_tokens", config.llm.chat_max_tokens),
    ];
    for (name, val) in token_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if config.session.history_turns == 0 {
        return Err(ConfigError::ValidationError {
            field: "session.history_turns".into(),
            message: "must be > 0".into(),
        });
    }

    let timeout = config.session.request_timeout_secs;
    if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&timeout) {
        return Err(ConfigError::ValidationError {
            field: "session.request_timeout_secs".into(),
            message: format!("must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}, got {timeout}"),
        });
    }

    let urls = [
        ("llm.api_url", Some(config.llm.api_url.as_str())),
        ("backend.url", config.backend.url.as_deref()),
    ];
    for (name, url) in urls {
        if let Some(url) = url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError {
                    field: name.to_string(),
                    message: format!("must be an http(s) URL, got `{url}`"),
                });
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ASSISTANT_TOML: &str = r#"
[llm]
model = "claude-sonnet-4-5-20250929"
extraction_max_tokens = 1500
chat_max_tokens = 800

[session]
history_turns = 12
request_timeout_secs = 30

[backend]
url = "http://127.0.0.1:4943/listings"
"#;

    fn write_config(dir: &Path, assistant: &str) {
        let config_dir = dir.join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("assistant.toml"), assistant).unwrap();
    }

    #[test]
    fn load_full_config() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), ASSISTANT_TOML);

        let config = load_config_from(tmp.path()).expect("should load valid config");
        assert_eq!(config.llm.model, "claude-sonnet-4-5-20250929");
        assert_eq!(config.llm.api_url, DEFAULT_API_URL);
        assert_eq!(config.llm.extraction_max_tokens, 1500);
        assert_eq!(config.llm.chat_max_tokens, 800);
        assert_eq!(config.session.history_turns, 12);
        assert_eq!(config.session.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.backend.url.as_deref(),
            Some("http://127.0.0.1:4943/listings")
        );
        assert!(config.credentials.anthropic_api_key.is_none());
    }

    #[test]
    fn optional_sections_take_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "[llm]\nmodel = \"m\"\n");

        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(config.session.history_turns, DEFAULT_HISTORY_TURNS);
        assert_eq!(config.session.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(config.llm.chat_max_tokens, 1024);
        assert!(config.backend.url.is_none());
    }

    #[test]
    fn credentials_toml_with_api_key() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), ASSISTANT_TOML);
        fs::write(
            tmp.path().join("config/credentials.toml"),
            "anthropic_api_key = \"sk-ant-test-key\"\n",
        )
        .unwrap();

        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(
            config.credentials.anthropic_api_key.as_deref(),
            Some("sk-ant-test-key")
        );
    }

    #[test]
    fn missing_assistant_toml_is_file_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "[llm\nmodel = ");
        let err = load_config_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn rejects_zero_history_turns() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "[llm]\nmodel = \"m\"\n[session]\nhistory_turns = 0\n",
        );
        let err = load_config_from(tmp.path()).unwrap_err();
        match err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "session.history_turns")
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "[llm]\nmodel = \"m\"\n[session]\nrequest_timeout_secs = 0\n",
        );
        let err = load_config_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "session.request_timeout_secs"));
    }

    #[test]
    fn rejects_non_http_backend_url() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            "[llm]\nmodel = \"m\"\n[backend]\nurl = \"ftp://example\"\n",
        );
        let err = load_config_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "backend.url"));
    }

    #[test]
    fn rejects_empty_model() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "[llm]\nmodel = \"  \"\n");
        let err = load_config_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "llm.model"));
    }

    #[test]
    fn ensure_config_files_copies_defaults_without_overwriting() {
        let tmp = tempfile::tempdir().unwrap();
        let defaults = tmp.path().join("defaults");
        fs::create_dir_all(&defaults).unwrap();
        fs::write(defaults.join("assistant.toml"), ASSISTANT_TOML).unwrap();
        fs::write(defaults.join("credentials.toml.example"), "anthropic_api_key = \"\"\n")
            .unwrap();

        let copied = ensure_config_files(tmp.path()).unwrap();
        assert_eq!(copied.len(), 1);
        assert!(tmp.path().join("config/assistant.toml").exists());
        assert!(!tmp.path().join("config/credentials.toml.example").exists());

        // User edits survive a second run.
        fs::write(tmp.path().join("config/assistant.toml"), "[llm]\nmodel = \"edited\"\n").unwrap();
        let copied = ensure_config_files(tmp.path()).unwrap();
        assert!(copied.is_empty());
        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(config.llm.model, "edited");
    }

    #[test]
    fn ensure_config_files_without_any_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ensure_config_files(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));
    }

    #[test]
    fn shipped_defaults_are_valid() {
        let tmp = tempfile::tempdir().unwrap();
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../defaults/assistant.toml");
        let content = fs::read_to_string(&shipped).expect("defaults/assistant.toml should exist");
        write_config(tmp.path(), &content);
        load_config_from(tmp.path()).expect("shipped defaults should validate");
    }
}
