//! Provider router: selects the model backend named in the config.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use ledgerclaw_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds the configured backends and knows which one is the default.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &ledgerclaw_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();
        router.register(
            name.clone(),
            build_one(name, &api_key, provider_config.api_url.as_deref()),
        );
    }

    // The default provider exists even when it has no [providers.x] table
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        router.register(
            config.default_provider.clone(),
            build_one(&config.default_provider, &api_key, None),
        );
    }

    tracing::debug!(providers = ?router.list(), default = %config.default_provider, "Providers ready");
    router
}

fn build_one(name: &str, api_key: &str, api_url: Option<&str>) -> Arc<dyn Provider> {
    if name == "anthropic" {
        let mut p = AnthropicProvider::new(api_key);
        if let Some(url) = api_url {
            p = p.with_base_url(url);
        }
        Arc::new(p)
    } else {
        let base_url = api_url
            .map(str::to_string)
            .unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
    }
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
