//! Engine definitions and URL matching.

use std::collections::BTreeMap;

use tabpilot_config::EngineConfig;
use tracing::warn;
use url::Url;

/// An AI chat surface the manager can open tabs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDef {
    pub id: String,
    pub new_chat_url: String,
    /// Hosts whose pages belong to this engine. Subdomains match too.
    pub hosts: Vec<String>,
}

impl EngineDef {
    pub fn new(id: &str, new_chat_url: &str, hosts: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            new_chat_url: new_chat_url.to_string(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Check whether `url` is a page of this engine.
    pub fn matches_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        self.hosts.iter().any(|pattern| {
            let pattern = pattern.to_ascii_lowercase();
            host == pattern
                || host
                    .strip_suffix(pattern.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

impl From<&EngineConfig> for EngineDef {
    fn from(config: &EngineConfig) -> Self {
        let hosts = if config.hosts.is_empty() {
            Url::parse(&config.new_chat_url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .into_iter()
                .collect()
        } else {
            config.hosts.clone()
        };
        Self {
            id: config.id.clone(),
            new_chat_url: config.new_chat_url.clone(),
            hosts,
        }
    }
}

/// Lookup table of known engines.
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    engines: BTreeMap<String, EngineDef>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EngineRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            engines: BTreeMap::new(),
        }
    }

    /// The engines supported out of the box.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for def in [
            EngineDef::new("chatgpt", "https://chatgpt.com/", &["chatgpt.com", "chat.openai.com"]),
            EngineDef::new("perplexity", "https://www.perplexity.ai/", &["perplexity.ai"]),
            EngineDef::new("gemini", "https://gemini.google.com/app", &["gemini.google.com"]),
            EngineDef::new("claude", "https://claude.ai/new", &["claude.ai"]),
            EngineDef::new("copilot", "https://copilot.microsoft.com/", &["copilot.microsoft.com"]),
        ] {
            registry.register(def);
        }
        registry
    }

    /// Built-ins plus configured engines; configured ids replace built-ins.
    pub fn from_config(engines: &[EngineConfig]) -> Self {
        let mut registry = Self::builtin();
        for config in engines {
            let def = EngineDef::from(config);
            if def.hosts.is_empty() {
                warn!("Engine '{}' has no usable host pattern", def.id);
            }
            registry.register(def);
        }
        registry
    }

    pub fn register(&mut self, def: EngineDef) {
        self.engines.insert(def.id.clone(), def);
    }

    pub fn get(&self, id: &str) -> Option<&EngineDef> {
        self.engines.get(id)
    }

    /// The engine a URL belongs to, if any.
    pub fn engine_for_url(&self, url: &str) -> Option<&EngineDef> {
        self.engines.values().find(|def| def.matches_url(url))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
#[path = "engines_tests.rs"]
mod tests;
