// ABOUTME: Implements the ProviderRegistry - named planning backends with
// ABOUTME: explicit or sole-provider resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Planner;
use crate::error::ProviderError;

/// Registry of planners keyed by name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Planner>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a planner. Disabled planners and duplicate names are rejected.
    pub fn register<P: Planner + 'static>(&mut self, planner: P) -> Result<(), ProviderError> {
        self.register_arc(Arc::new(planner))
    }

    pub fn register_arc(&mut self, planner: Arc<dyn Planner>) -> Result<(), ProviderError> {
        let name = planner.name().to_string();
        if !planner.is_enabled() {
            return Err(ProviderError::Disabled(name));
        }
        if self.providers.contains_key(&name) {
            return Err(ProviderError::AlreadyRegistered(name));
        }
        self.providers.insert(name, planner);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Planner>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Resolve `name`, or the sole registered planner when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn Planner>, ProviderError> {
        if let Some(name) = name {
            return self.get(name);
        }

        let mut all = self.providers.values();
        match (all.next(), all.next()) {
            (None, _) => Err(ProviderError::NoneRegistered),
            (Some(only), None) => Ok(only.clone()),
            (Some(_), Some(_)) => Err(ProviderError::Ambiguous(self.list())),
        }
    }
}
