//! Provider registry
//!
//! Holds the providers a process talks to and the capability profile of every
//! provider it knows about, including ones without a live client.

use crate::error::{CloudError, Result};
use crate::profile::{ProviderProfile, builtin_profiles};
use crate::provider::CloudProvider;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn CloudProvider>>,
    profiles: BTreeMap<String, ProviderProfile>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in provider profiles
    pub fn with_builtin_profiles() -> Result<Self> {
        let mut registry = Self::new();
        for profile in builtin_profiles()? {
            registry.profiles.insert(profile.name.clone(), profile);
        }
        Ok(registry)
    }

    /// Register a provider client. Its own profile becomes the profile of
    /// that name unless one was already overridden.
    pub fn register(&mut self, provider: Arc<dyn CloudProvider>) {
        let name = provider.name().to_string();
        tracing::debug!("Registering provider: {}", name);
        self.profiles
            .entry(name.clone())
            .or_insert_with(|| provider.profile().clone());
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn CloudProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::ProviderNotFound(name.to_string()))
    }

    pub fn profile(&self, name: &str) -> Result<&ProviderProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| CloudError::ProviderNotFound(name.to_string()))
    }

    /// Replace (or add) the profile of `profile.name`.
    pub fn override_profile(&mut self, profile: ProviderProfile) {
        if self.profiles.contains_key(&profile.name) {
            tracing::info!("Overriding built-in profile: {}", profile.name);
        }
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Names of registered provider clients
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// All known profiles, sorted by name
    pub fn profiles(&self) -> impl Iterator<Item = &ProviderProfile> {
        self.profiles.values()
    }
}
