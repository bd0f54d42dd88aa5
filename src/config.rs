use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::embedding::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VietragConfig {
    pub logging: LoggingConfig,
    pub embedding: EmbeddingConfig,
    pub retry: RetryConfig,
    pub addon_params: AddonParams,
    pub prompts: PromptConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"local"` (ONNX Runtime) or `"remote"` (hosted inference API).
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    /// ONNX graph path inside the model repository.
    pub onnx_file: String,
    pub embedding_dim: usize,
    /// Tokenizer truncation length. Below the model's 2048-token maximum.
    pub max_length: usize,
    /// Feed `token_type_ids` to the graph. BERT exports need it, XLM-R exports reject it.
    pub token_type_ids: bool,
    pub remote_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub multiplier: f64,
}

/// Extra parameters shared with the surrounding RAG pipeline.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AddonParams {
    /// Prompt language. Any spelling of Vietnamese (`vi`, `vn`, `Tiếng Việt`, ...)
    /// is accepted; unset means detect from the query text.
    pub language: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PromptConfig {
    /// Optional TOML file whose templates override the built-in ones.
    pub custom_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the pipeline's `vdb_*.json` vector stores.
    pub working_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_vietrag_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "AITeamVN/Vietnamese_Embedding".into(),
            cache_dir,
            onnx_file: "onnx/model.onnx".into(),
            embedding_dim: 1024,
            max_length: 512,
            token_type_ids: false,
            remote_base_url: "https://api-inference.huggingface.co".into(),
            request_timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_secs: 4.0,
            max_delay_secs: 10.0,
            multiplier: 1.0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            working_dir: "./rag_storage".into(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs_f64(self.min_delay_secs.max(0.0)),
            Duration::from_secs_f64(self.max_delay_secs.max(0.0)),
            self.multiplier,
        )
    }
}

/// Returns `~/.vietrag/`
pub fn default_vietrag_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vietrag")
}

/// Returns the default config file path: `~/.vietrag/config.toml`
pub fn default_config_path() -> PathBuf {
    default_vietrag_dir().join("config.toml")
}

impl VietragConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            VietragConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (VIETRAG_LOG_LEVEL, VIETRAG_LANGUAGE,
    /// VIETRAG_EMBEDDING_PROVIDER, VIETRAG_WORKING_DIR).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VIETRAG_LOG_LEVEL") {
            self.logging.log_level = val;
        }
        if let Ok(val) = std::env::var("VIETRAG_LANGUAGE") {
            self.addon_params.language = Some(val);
        }
        if let Ok(val) = std::env::var("VIETRAG_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("VIETRAG_WORKING_DIR") {
            self.storage.working_dir = val;
        }
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        expand_tilde(&self.embedding.cache_dir)
    }

    pub fn resolved_working_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.working_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VietragConfig::default();
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.embedding.embedding_dim, 1024);
        assert_eq!(config.embedding.max_length, 512);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.addon_params.language.is_none());
        assert!(config.embedding.cache_dir.ends_with("models"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[logging]
log_level = "debug"

[embedding]
provider = "remote"
model = "BAAI/bge-m3"

[addon_params]
language = "vi"
"#;
        let config: VietragConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.embedding.provider, "remote");
        assert_eq!(config.embedding.model, "BAAI/bge-m3");
        assert_eq!(config.addon_params.language.as_deref(), Some("vi"));
        // defaults still apply for unset fields
        assert_eq!(config.embedding.embedding_dim, 1024);
        assert_eq!(config.retry.max_delay_secs, 10.0);
    }

    #[test]
    fn pipeline_only_addon_keys_are_ignored() {
        let toml_str = r#"
[addon_params]
language = "Vietnamese"
entity_types = ["organization", "person"]
"#;
        let config: VietragConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.addon_params.language.as_deref(), Some("Vietnamese"));
    }

    #[test]
    fn retry_config_builds_policy() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(4));
        assert_eq!(policy.delay_after(5), Duration::from_secs(10));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = VietragConfig::default();
        std::env::set_var("VIETRAG_LOG_LEVEL", "trace");
        std::env::set_var("VIETRAG_WORKING_DIR", "/tmp/rag");

        config.apply_env_overrides();

        assert_eq!(config.logging.log_level, "trace");
        assert_eq!(config.storage.working_dir, "/tmp/rag");

        // Clean up
        std::env::remove_var("VIETRAG_LOG_LEVEL");
        std::env::remove_var("VIETRAG_WORKING_DIR");
    }
}
