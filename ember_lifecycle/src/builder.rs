//! Registration and startup.
//!
//! [`SystemBuilder`] collects descriptors and constructors, then `build`
//! runs every static check once, plans the memory map, allocates the arena
//! and enters the boot mode. Configuration errors surface here and never
//! after `build` returns.

use std::mem::{align_of, size_of};

use tracing::{debug, info};

use ember_arena::MemoryMapPlanner;
use ember_common::catalog::ResourceCatalog;
use ember_common::consts::MAX_SUBSYSTEMS;
use ember_common::descriptor::{CapabilityTable, MemoryClassDef, SubsystemDescriptor};
use ember_common::error::{ConfigResult, ConfigurationError, LifecycleError};
use ember_common::ids::{CapabilityId, CapabilitySet, SubsystemId, SubsystemSet};

use crate::manager::{LifecycleManager, ManagerSettings, SystemTables};
use crate::power::PowerControl;
use crate::subsystem::{Dependencies, ErasedConstructor, Subsystem, SubsystemError, erase};

/// Collects subsystems before the manager exists.
///
/// Passed by value into [`build`](Self::build); there is no global
/// registry.
pub struct SystemBuilder {
    catalog: ResourceCatalog,
    classes: Vec<MemoryClassDef>,
    capabilities: CapabilityTable,
    descriptors: Vec<SubsystemDescriptor>,
    constructors: Vec<Box<dyn ErasedConstructor>>,
}

impl SystemBuilder {
    /// Builder over the static tables.
    pub fn new(
        catalog: ResourceCatalog,
        classes: Vec<MemoryClassDef>,
        capabilities: CapabilityTable,
    ) -> Self {
        Self {
            catalog,
            classes,
            capabilities,
            descriptors: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// Register a subsystem of type `T`.
    ///
    /// `ctor` runs every time the subsystem becomes live, with its resolved
    /// dependencies. The returned id is the registration index.
    ///
    /// # Errors
    /// Duplicate name, too many subsystems, an invalid descriptor, a
    /// footprint smaller than `T`, or an unknown capability id.
    pub fn register_subsystem<T, F>(
        &mut self,
        descriptor: SubsystemDescriptor,
        ctor: F,
    ) -> ConfigResult<SubsystemId>
    where
        T: Subsystem,
        F: Fn(&Dependencies) -> Result<T, SubsystemError> + Send + Sync + 'static,
    {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(ConfigurationError::Duplicate {
                kind: "subsystem",
                name: descriptor.name,
            });
        }
        if self.descriptors.len() >= MAX_SUBSYSTEMS {
            return Err(ConfigurationError::LimitExceeded {
                kind: "subsystems",
                max: MAX_SUBSYSTEMS,
            });
        }
        descriptor.validate(&self.catalog, &self.classes)?;
        if size_of::<T>() > descriptor.size || align_of::<T>() > descriptor.align {
            return Err(ConfigurationError::FootprintTooSmall {
                subsystem: descriptor.name,
                declared_size: descriptor.size,
                declared_align: descriptor.align,
                type_size: size_of::<T>(),
                type_align: align_of::<T>(),
            });
        }
        let known = CapabilitySet::first_n(self.capabilities.len());
        let used = descriptor.dependencies.union(descriptor.provides);
        if let Some(unknown) = used.difference(known).first() {
            return Err(ConfigurationError::UnknownId {
                kind: "capability",
                index: unknown.index(),
            });
        }

        let id = SubsystemId::from_index(self.descriptors.len());
        debug!(subsystem = %descriptor.name, id = %id, "Subsystem registered");
        self.descriptors.push(descriptor);
        self.constructors.push(erase(ctor));
        Ok(id)
    }

    /// Resource catalog.
    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// Capability names.
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Number of registered subsystems.
    pub fn subsystem_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Validate, plan, allocate and boot.
    ///
    /// # Errors
    /// [`LifecycleError::InvalidConfiguration`] for a missing provider, a
    /// dependency cycle, an always-present subsystem that cannot resolve its
    /// dependencies in some mode or that shares an exclusive resource, or a
    /// layout exceeding capacity.
    pub fn build(
        self,
        power: impl PowerControl + 'static,
        settings: ManagerSettings,
    ) -> Result<LifecycleManager, LifecycleError> {
        self.check_providers()?;
        let order = self.construction_order()?;
        self.check_always_present()?;
        self.check_exclusive_claims()?;

        let layout = MemoryMapPlanner::new(&self.catalog, &self.classes).plan(&self.descriptors)?;
        let compatible = self
            .descriptors
            .iter()
            .map(|d| self.catalog.compatible_modes(d))
            .collect();

        info!(
            subsystems = self.descriptors.len(),
            regions = layout.regions().len(),
            bytes = layout.total_used(),
            "System planned"
        );

        let boot = self.catalog.boot_mode();
        let tables = SystemTables {
            catalog: self.catalog,
            capabilities: self.capabilities,
            descriptors: self.descriptors,
            constructors: self.constructors,
            compatible,
            layout,
            order,
            settings,
        };
        let manager = LifecycleManager::new(tables, Box::new(power));
        manager.transition_to(boot)?;
        Ok(manager)
    }

    fn providers_of(&self, capability: CapabilityId) -> SubsystemSet {
        self.descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.provides.contains(capability))
            .map(|(i, _)| SubsystemId::from_index(i))
            .collect()
    }

    fn check_providers(&self) -> ConfigResult<()> {
        for d in &self.descriptors {
            for cap in d.dependencies.iter() {
                if self.providers_of(cap).is_empty() {
                    return Err(ConfigurationError::UnprovidedCapability {
                        subsystem: d.name.clone(),
                        capability: self.capabilities.name(cap).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Topological order over "provides → depends on", ties broken by
    /// registration order.
    fn construction_order(&self) -> ConfigResult<Vec<SubsystemId>> {
        let count = self.descriptors.len();
        // Subsystems each one must wait for.
        let waits_for: Vec<SubsystemSet> = self
            .descriptors
            .iter()
            .map(|d| {
                d.dependencies
                    .iter()
                    .fold(SubsystemSet::EMPTY, |acc, cap| acc.union(self.providers_of(cap)))
            })
            .collect();

        let mut placed = SubsystemSet::EMPTY;
        let mut order = Vec::with_capacity(count);
        while order.len() < count {
            let next = (0..count)
                .map(SubsystemId::from_index)
                .find(|&id| !placed.contains(id) && waits_for[id.index()].is_subset_of(placed));
            match next {
                Some(id) => {
                    placed.insert(id);
                    order.push(id);
                }
                None => {
                    let stuck = (0..count)
                        .map(SubsystemId::from_index)
                        .find(|&id| !placed.contains(id))
                        .map_or("?", |id| self.descriptors[id.index()].name.as_str());
                    return Err(ConfigurationError::DependencyCycle {
                        subsystem: stuck.to_string(),
                    });
                }
            }
        }
        Ok(order)
    }

    /// Every mode must offer a provider for each always-present dependency.
    fn check_always_present(&self) -> ConfigResult<()> {
        for d in self.descriptors.iter().filter(|d| d.always_present) {
            for cap in d.dependencies.iter() {
                let providers = self.providers_of(cap);
                for mode in self.catalog.modes() {
                    let served = providers
                        .iter()
                        .any(|p| self.catalog.can_exist_in_mode(&self.descriptors[p.index()], mode.id));
                    if !served {
                        return Err(ConfigurationError::AlwaysPresentUnresolvable {
                            subsystem: d.name.clone(),
                            capability: self.capabilities.name(cap).to_string(),
                            mode: mode.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// An always-present subsystem must hold its exclusive resources alone.
    fn check_exclusive_claims(&self) -> ConfigResult<()> {
        let exclusive = self.catalog.exclusive_resources();
        for (index, d) in self.descriptors.iter().enumerate() {
            if !d.always_present {
                continue;
            }
            let held = d.required_resources.intersection(exclusive);
            let rival = self
                .descriptors
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != index)
                .find_map(|(_, o)| {
                    o.required_resources
                        .intersection(held)
                        .first()
                        .map(|resource| (resource, o))
                });
            if let Some((resource, other)) = rival {
                return Err(ConfigurationError::AlwaysPresentContended {
                    subsystem: d.name.clone(),
                    resource: self.catalog.resource_name(resource).to_string(),
                    other: other.name.clone(),
                });
            }
        }
        Ok(())
    }
}
