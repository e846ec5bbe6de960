//! Holds every configured provider and resolves a model tier to a live
//! provider. The tier->provider map is wrapped in an `ArcSwap` so the
//! delegation manager can be repointed at a different provider mix
//! (e.g. after a tier is rate-limited) without restarting the server.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::ProviderError;

use super::traits::LLMProvider;

pub struct ClientPool {
    by_tier: ArcSwap<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl ClientPool {
    pub fn new(providers: Vec<Arc<dyn LLMProvider>>) -> Self {
        let by_tier = providers
            .into_iter()
            .map(|p| (p.tier().to_string(), p))
            .collect();
        Self {
            by_tier: ArcSwap::from_pointee(by_tier),
        }
    }

    pub fn get(&self, tier: &str) -> Result<Arc<dyn LLMProvider>, ProviderError> {
        self.by_tier
            .load()
            .get(tier)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(tier.to_string()))
    }

    pub fn tiers(&self) -> Vec<String> {
        self.by_tier.load().keys().cloned().collect()
    }

    /// Atomically replaces the entire tier map, e.g. after a config reload.
    pub fn replace(&self, providers: Vec<Arc<dyn LLMProvider>>) {
        let by_tier = providers
            .into_iter()
            .map(|p| (p.tier().to_string(), p))
            .collect();
        self.by_tier.store(Arc::new(by_tier));
    }
}
