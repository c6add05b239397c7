//! Configuration for the document service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "SITEDOC_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Retention sweep configuration
    #[serde(default)]
    pub retention: RetentionConfig,
    /// DOCX splitter configuration
    #[serde(default)]
    pub splitter: SplitterConfig,
    /// External script configuration
    #[serde(default)]
    pub scripts: ScriptConfig,
    /// DeepSeek chat-completion configuration
    #[serde(default)]
    pub deepseek: DeepSeekConfig,
    /// Coze workflow configuration
    #[serde(default)]
    pub coze: CozeConfig,
}

impl AppConfig {
    /// Load configuration: optional TOML file from `SITEDOC_CONFIG`,
    /// then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
            self.deepseek.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("DEEPSEEK_API_URL") {
            self.deepseek.api_url = url;
        }
        if let Ok(token) = std::env::var("COZE_PAT_TOKEN") {
            self.coze.token = Some(token);
        }
        if let Ok(id) = std::env::var("COZE_WORKFLOW_ID") {
            self.coze.workflow_id = id;
        }
        if let Ok(python) = std::env::var("PYTHON_PATH") {
            self.scripts.interpreter = python;
        }
        if let Ok(dir) = std::env::var("SITEDOC_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("SITEDOC_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid SITEDOC_PORT: {}", port),
            }
        }
        if let Ok(base) = std::env::var("BASE_URL") {
            self.server.public_base_url = base;
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum upload size in bytes (default: 10MB)
    pub max_upload_size: usize,
    /// Externally reachable base URL, used for split file links
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_size: 10 * 1024 * 1024,
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding binaries, sidecars and split outputs
    pub upload_dir: PathBuf,
    /// Subdirectory (under `upload_dir`) for corrected spreadsheets
    pub modified_subdir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            modified_subdir: "modified".to_string(),
        }
    }
}

/// Retention sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run the background sweeper
    pub enabled: bool,
    /// Files unmodified for longer than this are deleted (default: 24h)
    pub max_age_secs: u64,
    /// Sweep interval (default: 6h)
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: 24 * 60 * 60,
            interval_secs: 6 * 60 * 60,
        }
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// DOCX splitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Pages per output file when the request does not say
    pub default_pages_per_file: u32,
    /// Paragraph blocks treated as one page when the document has no page breaks
    pub paragraphs_per_page: usize,
    /// Hard limit for one on-disk split (default: 5 minutes)
    pub timeout_secs: u64,
    /// External split script; the native splitter is used when unset
    #[serde(default)]
    pub script: Option<PathBuf>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            default_pages_per_file: 30,
            paragraphs_per_page: 40,
            timeout_secs: 300,
            script: None,
        }
    }
}

impl SplitterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// External script configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Interpreter used to run scripts
    pub interpreter: String,
    /// Spreadsheet correction script
    pub excel_script: PathBuf,
    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL
    pub kill_grace_secs: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            excel_script: PathBuf::from("scripts/modify_excel_by_sequence.py"),
            timeout_secs: 60,
            kill_grace_secs: 3,
        }
    }
}

impl ScriptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

/// DeepSeek chat-completion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSeekConfig {
    /// Chat completions endpoint
    pub api_url: String,
    /// Bearer token; analysis is refused when unset
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries for failed requests (0 = fail on first error)
    pub max_retries: u32,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.deepseek.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "deepseek-chat".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 120,
            max_retries: 0,
        }
    }
}

/// Coze workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CozeConfig {
    /// Streaming workflow endpoint
    pub api_url: String,
    /// Personal access token
    #[serde(default)]
    pub token: Option<String>,
    /// Workflow to run
    pub workflow_id: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CozeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.coze.cn/v1/workflow/stream_run".to_string(),
            token: None,
            workflow_id: String::new(),
            timeout_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.retention.max_age(), Duration::from_secs(86_400));
        assert_eq!(config.retention.interval(), Duration::from_secs(21_600));
        assert_eq!(config.splitter.paragraphs_per_page, 40);
        assert_eq!(config.splitter.timeout(), Duration::from_secs(300));
        assert_eq!(config.server.max_upload_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            [storage]
            upload_dir = "/srv/uploads"
            modified_subdir = "fixed"

            [splitter]
            default_pages_per_file = 10
            paragraphs_per_page = 25
            timeout_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.splitter.paragraphs_per_page, 25);
        assert!(config.splitter.script.is_none());
        // untouched sections fall back to defaults
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.deepseek.model, "deepseek-chat");
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::from_toml("[server]\nport = \"nope\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
