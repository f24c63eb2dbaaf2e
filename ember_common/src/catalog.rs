//! Resource catalog: hardware resources and per-mode availability.
//!
//! Built once at startup through [`CatalogBuilder`] and immutable afterwards,
//! so it is shared without locking. [`ResourceCatalog::can_exist_in_mode`] is
//! the single compatibility predicate used by the planner and the lifecycle
//! manager; [`can_exist`] is its `const` core for build-time checks.

use serde::Serialize;

use crate::consts::{MAX_MODES, MAX_RESOURCES};
use crate::descriptor::SubsystemDescriptor;
use crate::error::{ConfigResult, ConfigurationError};
use crate::ids::{ModeId, ModeSet, ResourceId, ResourceSet};

/// `required ⊆ available`. No requirement is always compatible.
#[inline]
pub const fn can_exist(required: ResourceSet, available: ResourceSet) -> bool {
    required.is_subset_of(available)
}

/// A named hardware capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDef {
    /// Catalog id.
    pub id: ResourceId,
    /// Unique name.
    pub name: String,
    /// At most one live subsystem may hold an exclusive resource.
    pub exclusive: bool,
}

/// A named operating mode and the resources available in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeDef {
    /// Catalog id.
    pub id: ModeId,
    /// Unique name.
    pub name: String,
    /// Resources powered in this mode.
    pub resources: ResourceSet,
}

/// Immutable resource/mode tables.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceCatalog {
    resources: Vec<ResourceDef>,
    modes: Vec<ModeDef>,
    boot_mode: ModeId,
    fail_safe_mode: ModeId,
}

impl ResourceCatalog {
    /// Start building a catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Resources available in `mode`, or `None` for an unknown mode.
    #[inline]
    pub fn resources_available(&self, mode: ModeId) -> Option<ResourceSet> {
        self.modes.get(mode.index()).map(|m| m.resources)
    }

    /// Whether `subsystem` may be live in `mode`. Unknown modes are never
    /// compatible.
    #[inline]
    pub fn can_exist_in_mode(&self, subsystem: &SubsystemDescriptor, mode: ModeId) -> bool {
        self.resources_available(mode)
            .is_some_and(|available| can_exist(subsystem.required_resources, available))
    }

    /// Every mode `subsystem` may be live in.
    pub fn compatible_modes(&self, subsystem: &SubsystemDescriptor) -> ModeSet {
        self.modes
            .iter()
            .filter(|m| can_exist(subsystem.required_resources, m.resources))
            .map(|m| m.id)
            .collect()
    }

    /// All registered modes.
    pub fn all_modes(&self) -> ModeSet {
        ModeSet::first_n(self.modes.len())
    }

    /// All registered resources.
    pub fn all_resources(&self) -> ResourceSet {
        ResourceSet::first_n(self.resources.len())
    }

    /// Resources flagged exclusive.
    pub fn exclusive_resources(&self) -> ResourceSet {
        self.resources
            .iter()
            .filter(|r| r.exclusive)
            .map(|r| r.id)
            .collect()
    }

    /// Whether `mode` is registered.
    #[inline]
    pub fn contains_mode(&self, mode: ModeId) -> bool {
        mode.index() < self.modes.len()
    }

    /// Mode definition.
    pub fn mode(&self, mode: ModeId) -> Option<&ModeDef> {
        self.modes.get(mode.index())
    }

    /// Resource definition.
    pub fn resource(&self, resource: ResourceId) -> Option<&ResourceDef> {
        self.resources.get(resource.index())
    }

    /// Iterate modes in registration order.
    pub fn modes(&self) -> impl Iterator<Item = &ModeDef> {
        self.modes.iter()
    }

    /// Iterate resources in registration order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceDef> {
        self.resources.iter()
    }

    /// Look up a mode by name.
    pub fn mode_id(&self, name: &str) -> Option<ModeId> {
        self.modes.iter().find(|m| m.name == name).map(|m| m.id)
    }

    /// Look up a resource by name.
    pub fn resource_id(&self, name: &str) -> Option<ResourceId> {
        self.resources.iter().find(|r| r.name == name).map(|r| r.id)
    }

    /// Mode name for logging; `"?"` for unknown ids.
    pub fn mode_name(&self, mode: ModeId) -> &str {
        self.mode(mode).map_or("?", |m| m.name.as_str())
    }

    /// Resource name for logging; `"?"` for unknown ids.
    pub fn resource_name(&self, resource: ResourceId) -> &str {
        self.resource(resource).map_or("?", |r| r.name.as_str())
    }

    /// Mode entered at boot.
    #[inline]
    pub fn boot_mode(&self) -> ModeId {
        self.boot_mode
    }

    /// Recovery target after an unrecoverable error.
    #[inline]
    pub fn fail_safe_mode(&self) -> ModeId {
        self.fail_safe_mode
    }

    /// Number of modes.
    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }
}

/// Incremental builder for [`ResourceCatalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    resources: Vec<ResourceDef>,
    modes: Vec<ModeDef>,
}

impl CatalogBuilder {
    /// Register a shareable resource.
    pub fn resource(&mut self, name: &str) -> ConfigResult<ResourceId> {
        self.add_resource(name, false)
    }

    /// Register a resource that at most one live subsystem may hold.
    pub fn exclusive_resource(&mut self, name: &str) -> ConfigResult<ResourceId> {
        self.add_resource(name, true)
    }

    fn add_resource(&mut self, name: &str, exclusive: bool) -> ConfigResult<ResourceId> {
        if self.resources.iter().any(|r| r.name == name) {
            return Err(ConfigurationError::Duplicate {
                kind: "resource",
                name: name.to_string(),
            });
        }
        if self.resources.len() >= MAX_RESOURCES {
            return Err(ConfigurationError::LimitExceeded {
                kind: "resources",
                max: MAX_RESOURCES,
            });
        }
        let id = ResourceId::from_index(self.resources.len());
        self.resources.push(ResourceDef {
            id,
            name: name.to_string(),
            exclusive,
        });
        Ok(id)
    }

    /// Register a mode with the given available resources.
    pub fn mode(&mut self, name: &str, resources: &[ResourceId]) -> ConfigResult<ModeId> {
        if self.modes.iter().any(|m| m.name == name) {
            return Err(ConfigurationError::Duplicate {
                kind: "mode",
                name: name.to_string(),
            });
        }
        if self.modes.len() >= MAX_MODES {
            return Err(ConfigurationError::LimitExceeded {
                kind: "modes",
                max: MAX_MODES,
            });
        }
        if let Some(unknown) = resources.iter().find(|r| r.index() >= self.resources.len()) {
            return Err(ConfigurationError::UnknownId {
                kind: "resource",
                index: unknown.index(),
            });
        }
        let id = ModeId::from_index(self.modes.len());
        self.modes.push(ModeDef {
            id,
            name: name.to_string(),
            resources: resources.iter().copied().collect(),
        });
        Ok(id)
    }

    /// Freeze the tables with the designated boot and fail-safe modes.
    pub fn build(self, boot_mode: ModeId, fail_safe_mode: ModeId) -> ConfigResult<ResourceCatalog> {
        if self.modes.is_empty() {
            return Err(ConfigurationError::NoModes);
        }
        for mode in [boot_mode, fail_safe_mode] {
            if mode.index() >= self.modes.len() {
                return Err(ConfigurationError::UnknownId {
                    kind: "mode",
                    index: mode.index(),
                });
            }
        }
        Ok(ResourceCatalog {
            resources: self.resources,
            modes: self.modes,
            boot_mode,
            fail_safe_mode,
        })
    }
}
