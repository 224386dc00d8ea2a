//! Synthesis providers and the registry that multiplexes them.

mod base;
pub mod http_speech;
pub mod mock_tone;

use std::collections::HashMap;
use std::sync::Arc;

pub use base::{
    CHUNK_CHANNEL_CAPACITY, ChunkReceiver, ProviderError, ProviderVoice, SynthesisRequest,
    TtsProvider,
};
pub use http_speech::{HttpSpeechConfig, HttpSpeechProvider};
pub use mock_tone::MockToneProvider;

/// A catalog entry: a voice plus the provider that owns it.
#[derive(Debug, Clone)]
pub struct CatalogVoice {
    pub provider_id: String,
    pub voice: ProviderVoice,
}

/// Resolves provider identifiers and aggregates voice catalogs.
///
/// Built once at startup; the catalog is immutable for the process
/// lifetime, so admission-time voice lookups are plain map reads.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn TtsProvider>>,
    catalog: Vec<CatalogVoice>,
}

impl ProviderRegistry {
    /// Assemble a registry from already-constructed providers, loading
    /// each provider's voice catalog.
    pub async fn from_providers(providers: Vec<Arc<dyn TtsProvider>>) -> Self {
        let mut map: HashMap<String, Arc<dyn TtsProvider>> = HashMap::new();
        let mut catalog = Vec::new();
        for provider in providers {
            let provider_id = provider.id().to_string();
            for voice in provider.list_voices().await {
                catalog.push(CatalogVoice {
                    provider_id: provider_id.clone(),
                    voice,
                });
            }
            map.insert(provider_id, provider);
        }
        Self {
            providers: map,
            catalog,
        }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn TtsProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// The full gateway voice catalog across all providers.
    pub fn voices(&self) -> &[CatalogVoice] {
        &self.catalog
    }

    /// Find a voice by id anywhere in the catalog.
    pub fn find_voice(&self, voice_id: &str) -> Option<&CatalogVoice> {
        self.catalog.iter().find(|entry| entry.voice.id == voice_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_resolves_providers_and_voices() {
        let providers: Vec<Arc<dyn TtsProvider>> = vec![Arc::new(MockToneProvider::default())];
        let registry = ProviderRegistry::from_providers(providers).await;

        assert!(registry.contains("mock_tone"));
        assert!(!registry.contains("nope"));
        assert!(registry.get("mock_tone").is_some());
        assert_eq!(registry.voices().len(), 1);

        let entry = registry.find_voice("en-US-mock-1").unwrap();
        assert_eq!(entry.provider_id, "mock_tone");
        assert!(registry.find_voice("missing-voice").is_none());
    }
}
