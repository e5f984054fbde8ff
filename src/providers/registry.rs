//! Provider registry and selection.
//!
//! The registry holds every registered [`ImageProvider`] plus the
//! prompt-capable partition, built at registration time. Selection is
//! uniform random:
//!
//! - [`ProviderRegistry::pick_any`] is the direct-provider path. Bypasses
//!   readiness entirely; the caller demands this provider class now.
//! - [`ProviderRegistry::pick_ready`] is the `auto` path. Samples among
//!   providers whose own `is_ready` holds; an empty ready set yields
//!   `None` and the caller falls back to the local pool.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use super::traits::ImageProvider;

/// Registry of image providers with capability partitioning.
#[derive(Default)]
pub struct ProviderRegistry {
    all: Vec<Arc<dyn ImageProvider>>,
    prompt_capable: Vec<Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Prompt-capable providers join both partitions.
    pub fn add(&mut self, provider: Arc<dyn ImageProvider>) {
        if provider.caps().prompt_capable {
            self.prompt_capable.push(Arc::clone(&provider));
        }
        self.all.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// All registered providers, registration order.
    pub fn all(&self) -> &[Arc<dyn ImageProvider>] {
        &self.all
    }

    /// Uniform random pick, ignoring readiness.
    ///
    /// With `prompt_required`, sampling is restricted to the
    /// prompt-capable partition. `None` only when the relevant partition
    /// is empty.
    pub fn pick_any(&self, prompt_required: bool) -> Option<Arc<dyn ImageProvider>> {
        let candidates = if prompt_required {
            &self.prompt_capable
        } else {
            &self.all
        };
        let picked = pick_uniform(candidates)?;
        debug!(provider = picked.name(), "picked provider");
        Some(picked)
    }

    /// Uniform random pick among currently-ready providers.
    pub fn pick_ready(&self) -> Option<Arc<dyn ImageProvider>> {
        let ready: Vec<_> = self
            .all
            .iter()
            .filter(|p| p.is_ready())
            .cloned()
            .collect();
        let picked = pick_uniform(&ready)?;
        debug!(provider = picked.name(), ready = ready.len(), "chose ready provider");
        Some(picked)
    }
}

fn pick_uniform(candidates: &[Arc<dyn ImageProvider>]) -> Option<Arc<dyn ImageProvider>> {
    match candidates.len() {
        0 => None,
        1 => Some(Arc::clone(&candidates[0])),
        n => {
            let idx = rand::thread_rng().gen_range(0..n);
            Some(Arc::clone(&candidates[idx]))
        }
    }
}
