//! Provider registry: `provider:model` strings to chat model clients.

use crate::anthropic::AnthropicClient;
use crate::config::RemoteLlmConfig;
use crate::custom::CustomClient;
use crate::error::{LlmError, Result};
use crate::google::GoogleClient;
use crate::openai::OpenAiClient;
use agent_graph::ChatModel;
use std::sync::Arc;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// API keys available to the registry, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

impl ProviderKeys {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
        }
    }
}

/// Split a `provider:model` spec. A bare model name defaults to `openai`.
fn split_spec(spec: &str) -> (&str, &str) {
    match spec.split_once(':') {
        Some((provider, model)) if !model.is_empty() => (provider, model),
        _ => ("openai", spec),
    }
}

/// Resolve a model spec to a chat model client.
///
/// `base_url` is required by the `custom` provider and overrides the
/// default endpoint for `openai` (self-hosted compatible servers).
pub fn resolve_model(
    spec: &str,
    keys: &ProviderKeys,
    base_url: Option<&str>,
) -> Result<Arc<dyn ChatModel>> {
    let (provider, model) = split_spec(spec);
    match provider {
        "openai" => {
            let api_key = keys
                .openai_api_key
                .clone()
                .ok_or_else(|| LlmError::ApiKeyNotFound("OPENAI_API_KEY".to_string()))?;
            let base = base_url.unwrap_or(OPENAI_BASE_URL);
            Ok(Arc::new(OpenAiClient::new(RemoteLlmConfig::new(
                api_key, base, model,
            ))))
        }
        "anthropic" => {
            let api_key = keys
                .anthropic_api_key
                .clone()
                .ok_or_else(|| LlmError::ApiKeyNotFound("ANTHROPIC_API_KEY".to_string()))?;
            Ok(Arc::new(AnthropicClient::new(RemoteLlmConfig::new(
                api_key,
                ANTHROPIC_BASE_URL,
                model,
            ))))
        }
        "google" => {
            let api_key = keys
                .google_api_key
                .clone()
                .ok_or_else(|| LlmError::ApiKeyNotFound("GOOGLE_API_KEY".to_string()))?;
            Ok(Arc::new(GoogleClient::new(RemoteLlmConfig::new(
                api_key,
                GOOGLE_BASE_URL,
                model,
            ))))
        }
        "custom" => {
            let base = base_url.ok_or_else(|| {
                LlmError::InvalidConfig("custom provider requires base_url".to_string())
            })?;
            Ok(Arc::new(CustomClient::new(
                base,
                model,
                keys.openai_api_key.clone(),
            )))
        }
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> ProviderKeys {
        ProviderKeys {
            openai_api_key: Some("sk-test".to_string()),
            anthropic_api_key: Some("sk-ant-test".to_string()),
            google_api_key: Some("g-test".to_string()),
        }
    }

    #[test]
    fn bare_model_defaults_to_openai() {
        let model = resolve_model("gpt-4o-mini", &keys(), None).unwrap();
        assert_eq!(model.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn prefixed_specs_route_by_provider() {
        for spec in [
            "openai:gpt-4o-mini",
            "anthropic:claude-sonnet-4-5",
            "google:gemini-2.0-flash",
        ] {
            let model = resolve_model(spec, &keys(), None).unwrap();
            assert_eq!(model.model_name(), spec.split_once(':').unwrap().1);
        }
    }

    #[test]
    fn custom_requires_base_url() {
        let err = resolve_model("custom:llama3", &keys(), None).err().unwrap();
        assert!(matches!(err, LlmError::InvalidConfig(_)));

        let model = resolve_model("custom:llama3", &keys(), Some("http://localhost:8000/v1"));
        assert!(model.is_ok());
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let err = resolve_model("acme:model-x", &keys(), None).err().unwrap();
        assert!(matches!(err, LlmError::UnknownProvider(_)));
    }

    #[test]
    fn missing_key_is_reported() {
        let err = resolve_model("openai:gpt-4o-mini", &ProviderKeys::default(), None).err().unwrap();
        assert!(matches!(err, LlmError::ApiKeyNotFound(_)));
    }
}
