//! # Requirement registry - requirement name to provider routing.
//!
//! The registry owns every provider and maps each requirement name a
//! provider serves onto it. The scheduler asks the registry to instantiate
//! bindings during activity creation and routes upstream completions to the
//! right provider by provider name.
//!
//! ## Rules
//! - Registering a provider claims all of its requirement names; a name
//!   already claimed is replaced with a warning (last registration wins).
//! - Unregistering a provider releases every name it claimed.
//! - Unknown requirement names surface as validation-time errors.
//! - Completions for unknown providers are dropped with a warning.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::activity::ActivityId;
use crate::error::ManagerError;

use super::binding::{RequirementBinding, RequirementBroadcast};
use super::provider::{Completion, RequirementProvider};

/// Result of routing one completion to a provider.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Transitions to apply, in commit order.
    pub broadcasts: Vec<RequirementBroadcast>,
    /// True if this completion disabled the provider (permanent failure).
    pub provider_disabled: bool,
}

/// Registry of requirement providers.
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Box<dyn RequirementProvider>>,
    by_requirement: HashMap<&'static str, &'static str>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            by_requirement: HashMap::new(),
        }
    }

    /// Registers a provider under every requirement name it serves.
    pub fn register(&mut self, provider: Box<dyn RequirementProvider>) {
        let provider_name = provider.name();
        for &requirement in provider.provided() {
            if let Some(previous) = self.by_requirement.insert(requirement, provider_name) {
                warn!(
                    requirement,
                    previous,
                    provider = provider_name,
                    "requirement re-registered"
                );
            }
        }
        self.providers.insert(provider_name, provider);
    }

    /// Removes a provider, releasing every requirement name it claimed.
    pub fn unregister(&mut self, provider_name: &str) -> bool {
        if self.providers.remove(provider_name).is_none() {
            return false;
        }
        self.by_requirement
            .retain(|_, claimed_by| *claimed_by != provider_name);
        true
    }

    /// Enables every registered provider.
    pub fn enable_all(&mut self) {
        for provider in self.providers.values_mut() {
            provider.enable();
        }
    }

    /// Disables every registered provider.
    pub fn disable_all(&mut self) {
        for provider in self.providers.values_mut() {
            provider.disable();
        }
    }

    /// True if some provider serves `name`.
    pub fn knows(&self, name: &str) -> bool {
        self.by_requirement.contains_key(name)
    }

    /// Instantiates a binding of `name` for `activity`.
    pub fn instantiate(
        &mut self,
        activity: ActivityId,
        name: &str,
        value: &Value,
    ) -> Result<RequirementBinding, ManagerError> {
        let provider = self
            .by_requirement
            .get(name)
            .and_then(|provider_name| self.providers.get_mut(provider_name))
            .ok_or_else(|| ManagerError::UnknownRequirement {
                name: name.to_string(),
            })?;
        provider.instantiate(activity, name, value)
    }

    /// Drops `activity` from every provider's broadcast lists.
    pub fn unlink_activity(&mut self, activity: ActivityId) {
        for provider in self.providers.values_mut() {
            provider.unlink(activity);
        }
    }

    /// Routes one upstream completion to the named provider.
    pub fn ingest(&mut self, provider_name: &str, completion: Completion) -> IngestOutcome {
        let Some(provider) = self.providers.get_mut(provider_name) else {
            warn!(provider = provider_name, "completion for unknown provider dropped");
            return IngestOutcome::default();
        };

        let was_enabled = provider.is_enabled();
        let broadcasts = provider.ingest(completion);
        IngestOutcome {
            broadcasts,
            provider_disabled: was_enabled && !provider.is_enabled(),
        }
    }

    /// Introspection snapshot of every provider, keyed by provider name.
    pub fn snapshot(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, provider) in &self.providers {
            map.insert(name.to_string(), provider.snapshot());
        }
        Value::Object(map)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
