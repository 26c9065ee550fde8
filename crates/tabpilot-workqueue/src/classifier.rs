//! Error classification.
//!
//! Maps free-form failure text from an automation attempt onto the retry
//! policy. Categories are checked in a fixed precedence order and the first
//! match wins; anything unrecognised falls through to [`ErrorCategory::Skip`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure category driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Anti-automation challenge. Needs a human.
    Captcha,
    /// Engine session lapsed. Needs a human to sign in again.
    LoginRequired,
    /// Transient infrastructure failure.
    Retryable,
    /// Unknown or permanent failure.
    Skip,
}

const CAPTCHA_PATTERNS: &[&str] = &[
    "captcha",
    "recaptcha",
    "hcaptcha",
    "cloudflare",
    "challenge",
    "verify",
];

const LOGIN_PATTERNS: &[&str] = &[
    "login",
    "sign in",
    "unauthorized",
    "session expired",
    "authentication",
];

const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "network",
    "fetch",
    "connection",
    "econnreset",
    "tab load",
    "page not ready",
];

/// Classify an error message. Total: every input maps to one category.
pub fn classify(error_text: &str) -> ErrorCategory {
    let text = error_text.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| text.contains(p));

    if matches(CAPTCHA_PATTERNS) {
        ErrorCategory::Captcha
    } else if matches(LOGIN_PATTERNS) {
        ErrorCategory::LoginRequired
    } else if matches(RETRYABLE_PATTERNS) {
        ErrorCategory::Retryable
    } else {
        ErrorCategory::Skip
    }
}

impl ErrorCategory {
    /// Whether failures of this category go back to the queue.
    pub fn is_retryable(self) -> bool {
        self == ErrorCategory::Retryable
    }

    /// Whether a human has to step in before the engine is usable again.
    pub fn needs_attention(self) -> bool {
        matches!(self, ErrorCategory::Captcha | ErrorCategory::LoginRequired)
    }

    /// Stable string form, matching the serialized representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Captcha => "captcha",
            ErrorCategory::LoginRequired => "login_required",
            ErrorCategory::Retryable => "retryable",
            ErrorCategory::Skip => "skip",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
