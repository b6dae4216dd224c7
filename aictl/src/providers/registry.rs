//! Provider tag to adapter resolution.
//!
//! The dispatch table is fixed at construction. Lookup is case-insensitive
//! and supports aliases ("anthropic" and "claude" share one adapter). An
//! unknown tag is a hard error - requests are never silently routed to a
//! default adapter.

use super::anthropic::AnthropicAdapter;
use super::image::ImageAdapter;
use super::openai::OpenAiAdapter;
use super::transcription::TranscriptionAdapter;
use super::yandex::YandexAdapter;
use super::ProviderAdapter;
use crate::crypto::CredentialVault;
use crate::errors::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProviderRegistry {
    adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(client: reqwest::Client, vault: Arc<CredentialVault>) -> Self {
        let openai_compatible = |default_model: &'static str| -> Arc<dyn ProviderAdapter> {
            Arc::new(OpenAiAdapter::new(client.clone(), vault.clone(), default_model))
        };

        let mut adapters: HashMap<&'static str, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert("openai", openai_compatible("gpt-4"));
        adapters.insert("mistral", openai_compatible("mistral-large-latest"));
        adapters.insert("deepseek", openai_compatible("deepseek-chat"));
        adapters.insert("qwen", openai_compatible("qwen-turbo"));
        let gigachat = openai_compatible("GigaChat");
        adapters.insert("sber", gigachat.clone());
        adapters.insert("gigachat", gigachat);

        let anthropic: Arc<dyn ProviderAdapter> = Arc::new(AnthropicAdapter::new(client.clone(), vault.clone()));
        adapters.insert("anthropic", anthropic.clone());
        adapters.insert("claude", anthropic);

        adapters.insert("yandex", Arc::new(YandexAdapter::new(client.clone(), vault.clone())));
        adapters.insert(
            "whisper",
            Arc::new(TranscriptionAdapter::new(client.clone(), vault.clone())),
        );
        adapters.insert("pollinations", Arc::new(ImageAdapter::new(client, vault)));

        Self { adapters }
    }

    /// Resolve a provider tag to its adapter, case-insensitively.
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(tag.to_lowercase().as_str())
            .cloned()
            .ok_or_else(|| Error::UnknownProvider { tag: tag.to_string() })
    }

    /// Registered tags, for configuration validation at startup.
    pub fn known_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.adapters.keys().copied()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("tags", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
