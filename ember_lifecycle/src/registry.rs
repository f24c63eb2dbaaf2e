//! Dependency registry for live providers.
//!
//! Maps each capability to the subsystem currently providing it. Only the
//! lifecycle manager mutates the registry, and only while it holds the
//! transition lock. A checkpoint taken at the start of a transition lets the
//! manager ask which bindings changed, so subsystems that stay live are
//! refreshed instead of rebuilt.

use ember_common::consts::MAX_CAPABILITIES;
use ember_common::error::LifecycleError;
use ember_common::ids::{CapabilityId, CapabilitySet, SubsystemId};

/// Capability → provider bindings for the current mode.
///
/// Fixed-size tables, no allocation after construction.
#[derive(Debug, Clone)]
pub struct DependencyRegistry {
    bindings: [Option<SubsystemId>; MAX_CAPABILITIES],
    checkpoint: [Option<SubsystemId>; MAX_CAPABILITIES],
}

impl DependencyRegistry {
    /// Registry with no bindings.
    pub fn new() -> Self {
        Self {
            bindings: [None; MAX_CAPABILITIES],
            checkpoint: [None; MAX_CAPABILITIES],
        }
    }

    /// Bind `capability` to `provider`, replacing any prior binding.
    ///
    /// Returns the previous provider.
    pub fn bind(&mut self, capability: CapabilityId, provider: SubsystemId) -> Option<SubsystemId> {
        self.bindings
            .get_mut(capability.index())
            .and_then(|slot| slot.replace(provider))
    }

    /// Remove the binding for `capability`.
    pub fn unbind(&mut self, capability: CapabilityId) -> Option<SubsystemId> {
        self.bindings
            .get_mut(capability.index())
            .and_then(Option::take)
    }

    /// Remove every binding held by `provider`. Returns the capabilities
    /// that lost their provider.
    pub fn unbind_provider(&mut self, provider: SubsystemId) -> CapabilitySet {
        let mut removed = CapabilitySet::EMPTY;
        for (index, slot) in self.bindings.iter_mut().enumerate() {
            if *slot == Some(provider) {
                *slot = None;
                removed.insert(CapabilityId::from_index(index));
            }
        }
        removed
    }

    /// Current provider of `capability`.
    ///
    /// # Errors
    /// [`LifecycleError::DependencyUnresolved`] if nothing is bound.
    pub fn resolve(&self, capability: CapabilityId) -> Result<SubsystemId, LifecycleError> {
        self.provider(capability)
            .ok_or(LifecycleError::DependencyUnresolved { capability })
    }

    /// Current provider of `capability`, if any.
    #[inline]
    pub fn provider(&self, capability: CapabilityId) -> Option<SubsystemId> {
        self.bindings.get(capability.index()).copied().flatten()
    }

    /// Capabilities with a bound provider.
    pub fn bound(&self) -> CapabilitySet {
        self.iter().map(|(cap, _)| cap).collect()
    }

    /// Iterate `(capability, provider)` bindings in capability order.
    pub fn iter(&self) -> impl Iterator<Item = (CapabilityId, SubsystemId)> + '_ {
        self.bindings
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (CapabilityId::from_index(i), p)))
    }

    /// Remember the current bindings.
    pub fn checkpoint(&mut self) {
        self.checkpoint = self.bindings;
    }

    /// Capabilities whose provider differs from the last checkpoint,
    /// including ones that became bound or unbound.
    pub fn changed_since_checkpoint(&self) -> CapabilitySet {
        self.bindings
            .iter()
            .zip(self.checkpoint.iter())
            .enumerate()
            .filter(|(_, (now, then))| now != then)
            .map(|(i, _)| CapabilityId::from_index(i))
            .collect()
    }
}

impl Default for DependencyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
