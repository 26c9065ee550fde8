//! Configuration loader.
//!
//! Reads TOML, substituting `${VAR}` and `${VAR:-fallback}` from the
//! environment before parsing.

use std::fs;
use std::io;
use std::path::Path;

use regex::{Captures, Regex};

use crate::error::ConfigError;
use crate::schema::Config;

const ENV_REFERENCE: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::load_str(&content)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        Ok(toml::from_str(&expanded)?)
    }

    /// Substitute environment references. The first unset variable without
    /// a fallback is an error.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let pattern = Regex::new(ENV_REFERENCE).map_err(|e| ConfigError::InvalidValue {
            field: "environment reference".to_string(),
            message: e.to_string(),
        })?;

        let mut missing: Option<String> = None;
        let expanded = pattern.replace_all(content, |caps: &Captures| {
            match (std::env::var(&caps[1]), caps.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(fallback)) => fallback.as_str().to_string(),
                (Err(_), None) => {
                    missing.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(name) => Err(ConfigError::EnvVarNotSet(name)),
            None => Ok(expanded.into_owned()),
        }
    }

    /// Expand `~` in configured paths.
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.browser.task_execution_timeout_ms, 180_000);
    }

    #[test]
    fn test_load_basic_config() {
        let content = r#"
            [queue]
            max_retries = 5
            base_retry_delay_ms = 1000

            [scheduler]
            max_concurrent = 3
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.queue.base_retry_delay_ms, 1000);
        assert_eq!(config.queue.max_retry_delay_ms, 300_000);
        assert_eq!(config.scheduler.max_concurrent, 3);
    }

    #[test]
    fn test_load_engines() {
        let content = r#"
            [[engines]]
            id = "mistral"
            new_chat_url = "https://chat.mistral.ai/chat"
            hosts = ["chat.mistral.ai"]
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.engines.len(), 1);
        assert_eq!(config.engines[0].id, "mistral");
        assert_eq!(config.engines[0].hosts, vec!["chat.mistral.ai"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[browser]").unwrap();
        writeln!(file, "endpoint = \"http://localhost:9333\"").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.browser.endpoint, "http://localhost:9333");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/tabpilot.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/tabpilot.toml")).unwrap();
        assert_eq!(config.scheduler.max_concurrent, 1);
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("TABPILOT_TEST_ENDPOINT", "http://127.0.0.1:9999");
        }
        let content = "[browser]\nendpoint = \"${TABPILOT_TEST_ENDPOINT}\"";
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.browser.endpoint, "http://127.0.0.1:9999");
        unsafe {
            std::env::remove_var("TABPILOT_TEST_ENDPOINT");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_TABPILOT_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_env_vars_fallback() {
        let content = "[browser]\nendpoint = \"${NONEXISTENT_TABPILOT_ENDPOINT:-http://localhost:9333}\"";
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.browser.endpoint, "http://localhost:9333");
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/test");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/test"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        let path = "/var/lib/tabpilot";
        assert_eq!(ConfigLoader::expand_path(path), path);
    }
}
