use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, Result};
use crate::llm::{default_profile, ModelProfile};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDefaults {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "ollama".into()
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ModelDefaults {
    /// A profile for `provider`, filled with the platform defaults and
    /// overridden by whatever this config specifies.
    pub fn profile(&self, provider: &str) -> ModelProfile {
        let mut profile = default_profile(provider);
        if !self.model.is_empty() {
            profile.model = self.model.clone();
        }
        if let Some(api_key) = &self.api_key {
            profile.api_key = api_key.clone();
        }
        if let Some(base_url) = &self.base_url {
            profile.base_url = base_url.clone();
        }
        if let Some(temperature) = self.temperature {
            profile.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            profile.max_tokens = max_tokens;
        }
        profile
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_agents_file")]
    pub agents_file: String,
    #[serde(default = "default_sessions_file")]
    pub sessions_file: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelDefaults,
}

fn default_agents_file() -> String {
    "agents.json".into()
}

fn default_sessions_file() -> String {
    "sessions.json".into()
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| HiveError::Protocol(format!("Failed to parse configuration: {err}")))
    }

    /// Config from an optional file, with `HIVEMIND_*` environment
    /// overrides applied on top. A missing file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(agents_file) = env::var("HIVEMIND_AGENTS_FILE") {
            cfg.agents_file = agents_file;
        }
        if let Ok(sessions_file) = env::var("HIVEMIND_SESSIONS_FILE") {
            cfg.sessions_file = sessions_file;
        }
        if let Ok(host) = env::var("HIVEMIND_HOST") {
            cfg.server.host = host;
        }
        if let Ok(port) = env::var("HIVEMIND_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                cfg.server.port = parsed;
            }
        }
        if let Ok(provider) = env::var("HIVEMIND_PROVIDER") {
            cfg.model.provider = provider;
        }
        if let Ok(model) = env::var("HIVEMIND_MODEL") {
            cfg.model.model = model;
        }
        if let Ok(api_key) = env::var("HIVEMIND_API_KEY") {
            cfg.model.api_key = Some(api_key);
        }
        if let Ok(base_url) = env::var("HIVEMIND_BASE_URL") {
            cfg.model.base_url = Some(base_url);
        }
        Ok(cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agents_file: default_agents_file(),
            sessions_file: default_sessions_file(),
            server: ServerConfig::default(),
            model: ModelDefaults::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_file_and_applies_env_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "agents_file='/tmp/a.json'\n[server]\nhost='0.0.0.0'\nport=9000\n[model]\nprovider='openai'\nmodel='gpt-4o'"
        )
        .unwrap();

        env::set_var("HIVEMIND_PORT", "9100");
        let cfg = AppConfig::load(Some(file.path())).unwrap();
        env::remove_var("HIVEMIND_PORT");

        assert_eq!(cfg.agents_file, "/tmp/a.json");
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.model.provider, "openai");
        assert_eq!(cfg.model.model, "gpt-4o");
    }

    #[test]
    fn missing_file_argument_falls_back_to_defaults() {
        let cfg = AppConfig::load(None).unwrap();
        assert_eq!(cfg.agents_file, "agents.json");
        assert_eq!(cfg.model.provider, "ollama");
    }

    #[test]
    fn model_defaults_merge_onto_platform_profile() {
        let defaults = ModelDefaults {
            provider: "ollama".into(),
            model: "llama3.2".into(),
            api_key: None,
            base_url: Some("http://10.0.0.2:11434".into()),
            temperature: Some(0.7),
            max_tokens: None,
        };
        let profile = defaults.profile("ollama");
        assert_eq!(profile.model, "llama3.2");
        assert_eq!(profile.base_url, "http://10.0.0.2:11434");
        assert_eq!(profile.temperature, 0.7);
        assert_eq!(profile.max_tokens, 4096);
    }
}
