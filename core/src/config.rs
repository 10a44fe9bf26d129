//! Environment-sourced configuration.
//!
//! Binaries load a `.env` file via `dotenvy` before constructing these; the
//! types themselves only look at the process environment.

use std::env;

use anyhow::{Context, Result};

pub const DEFAULT_AZURE_DEPLOYMENT: &str = "gpt-4o-mini";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Credentials for the hosted realtime rooms.
#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl LiveKitConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            url: require(&lookup, "LIVEKIT_URL")?,
            api_key: require(&lookup, "LIVEKIT_API_KEY")?,
            api_secret: require(&lookup, "LIVEKIT_API_SECRET")?,
        })
    }
}

/// Azure OpenAI chat completion settings.
///
/// `None` when the key or endpoint is absent; the chat endpoint then degrades
/// to a canned reply instead of failing.
#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
}

impl AzureOpenAiConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            api_key: lookup("AZURE_OPENAI_API_KEY")?,
            endpoint: lookup("AZURE_OPENAI_ENDPOINT")?,
            deployment: lookup("AZURE_OPENAI_DEPLOYMENT_NAME")
                .unwrap_or_else(|| DEFAULT_AZURE_DEPLOYMENT.to_string()),
            api_version: lookup("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        })
    }
}

/// Settings for the hosted realtime speech dialog.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub api_key: String,
    pub model: String,
    pub voice: Option<String>,
}

impl RealtimeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            api_key: require(&lookup, "OPENAI_API_KEY")?,
            model: lookup("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
            voice: lookup("OPENAI_REALTIME_VOICE"),
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("`{key}` is not set"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_in<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|value| value.to_string())
    }

    #[test]
    fn livekit_config_requires_all_three_variables() {
        let incomplete = lookup_in(&[
            ("LIVEKIT_URL", "wss://example.livekit.cloud"),
            ("LIVEKIT_API_KEY", "key"),
        ]);
        let error = LiveKitConfig::from_lookup(incomplete).unwrap_err();
        assert!(error.to_string().contains("LIVEKIT_API_SECRET"));
    }

    #[test]
    fn azure_config_defaults_deployment_and_api_version() {
        let minimal = lookup_in(&[
            ("AZURE_OPENAI_API_KEY", "key"),
            ("AZURE_OPENAI_ENDPOINT", "https://res.openai.azure.com"),
        ]);
        let config = AzureOpenAiConfig::from_lookup(minimal).unwrap();
        assert_eq!(config.deployment, DEFAULT_AZURE_DEPLOYMENT);
        assert_eq!(config.api_version, DEFAULT_AZURE_API_VERSION);
    }

    #[test]
    fn azure_config_is_absent_without_credentials() {
        let empty = lookup_in(&[("AZURE_OPENAI_API_KEY", "key")]);
        assert!(AzureOpenAiConfig::from_lookup(empty).is_none());
    }

    #[test]
    fn realtime_config_defaults_the_model() {
        let minimal = lookup_in(&[("OPENAI_API_KEY", "key")]);
        let config = RealtimeConfig::from_lookup(minimal).unwrap();
        assert_eq!(config.model, DEFAULT_REALTIME_MODEL);
        assert!(config.voice.is_none());
    }
}
