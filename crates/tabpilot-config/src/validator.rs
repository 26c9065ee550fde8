//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a `ConfigError`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(e) => Err(ConfigError::InvalidValue {
                field: e.path,
                message: e.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_queue(config, &mut result);
        Self::validate_browser(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_engines(config, &mut result);

        result
    }

    fn validate_queue(config: &Config, result: &mut ValidationResult) {
        let queue = &config.queue;

        if queue.base_retry_delay_ms == 0 {
            result.add_error(ValidationError::new(
                "queue.base_retry_delay_ms",
                "base_retry_delay_ms must be greater than 0",
            ));
        }

        if queue.base_retry_delay_ms > queue.max_retry_delay_ms {
            result.add_error(ValidationError::new(
                "queue.max_retry_delay_ms",
                "max_retry_delay_ms must not be smaller than base_retry_delay_ms",
            ));
        }

        if queue.max_retries > 20 {
            result.add_warning(ValidationWarning::new(
                "queue.max_retries",
                "max_retries is very high (>20); exhausted tasks will linger for a long time",
            ));
        }
    }

    fn validate_browser(config: &Config, result: &mut ValidationResult) {
        let browser = &config.browser;

        if !browser.endpoint.starts_with("http://") && !browser.endpoint.starts_with("https://") {
            result.add_error(ValidationError::new(
                "browser.endpoint",
                "endpoint must start with http:// or https://",
            ));
        }

        for (field, value) in [
            ("browser.tab_load_timeout_ms", browser.tab_load_timeout_ms),
            ("browser.task_execution_timeout_ms", browser.task_execution_timeout_ms),
        ] {
            if value == 0 {
                result.add_error(ValidationError::new(field, "timeout must be greater than 0"));
            }
        }

        if browser.tab_settle_delay_ms > browser.tab_load_timeout_ms {
            result.add_warning(ValidationWarning::new(
                "browser.tab_settle_delay_ms",
                "settle delay is longer than the load timeout",
            ));
        }

        if browser.cleanup_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "browser.cleanup_interval_secs",
                "cleanup_interval_secs must be greater than 0",
            ));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        if config.scheduler.max_concurrent == 0 {
            result.add_error(ValidationError::new(
                "scheduler.max_concurrent",
                "max_concurrent must be greater than 0",
            ));
        }

        if config.scheduler.max_concurrent > 8 {
            result.add_warning(ValidationWarning::new(
                "scheduler.max_concurrent",
                "many concurrent tabs in the user's browser may be noticeable",
            ));
        }

        if config.scheduler.submit_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "scheduler.submit_interval_secs",
                "submit_interval_secs must be greater than 0",
            ));
        }
    }

    fn validate_engines(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, engine) in config.engines.iter().enumerate() {
            let path = format!("engines[{}]", i);

            if engine.id.is_empty() {
                result.add_error(ValidationError::new(&path, "engine id cannot be empty"));
            } else if !seen.insert(engine.id.as_str()) {
                result.add_error(ValidationError::new(
                    &path,
                    format!("duplicate engine id '{}'", engine.id),
                ));
            }

            if !engine.new_chat_url.starts_with("https://")
                && !engine.new_chat_url.starts_with("http://")
            {
                result.add_error(ValidationError::new(
                    format!("{}.new_chat_url", path),
                    "new_chat_url must start with http:// or https://",
                ));
            }

            if engine.hosts.is_empty() {
                result.add_warning(ValidationWarning::new(
                    format!("{}.hosts", path),
                    "no hosts listed; the host of new_chat_url will be used",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
