//! Subsystem descriptors, memory classes and the capability name table.
//!
//! A [`SubsystemDescriptor`] is the static metadata of one component: where
//! it lives (memory class), how much it needs (size/alignment), what
//! hardware it needs (required resources) and what it depends on or offers
//! (capabilities). Descriptors are immutable once registered; the
//! registration index is the subsystem's [`SubsystemId`](crate::ids::SubsystemId).

use serde::Serialize;

use crate::catalog::ResourceCatalog;
use crate::consts::{DEFAULT_ALIGN, MAX_ALIGN, MAX_CAPABILITIES, MAX_DEPENDENCIES, MAX_MEMORY_CLASSES};
use crate::error::{ConfigResult, ConfigurationError};
use crate::ids::{CapabilityId, CapabilitySet, MemoryClass, ResourceId, ResourceSet};

/// Round `value` up to a multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
#[inline]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Static metadata for one subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemDescriptor {
    /// Unique name.
    pub name: String,
    /// Arena the subsystem is placed in.
    pub memory_class: MemoryClass,
    /// Reserved footprint in bytes.
    pub size: usize,
    /// Required alignment (power of two, at most [`MAX_ALIGN`]).
    pub align: usize,
    /// Resources that must be available for the subsystem to be live.
    pub required_resources: ResourceSet,
    /// Live in every mode, gets a dedicated region.
    pub always_present: bool,
    /// Capabilities that must be bound before construction.
    pub dependencies: CapabilitySet,
    /// Capabilities this subsystem offers to others.
    pub provides: CapabilitySet,
}

impl SubsystemDescriptor {
    /// Descriptor with default alignment and no requirements.
    pub fn new(name: impl Into<String>, memory_class: MemoryClass, size: usize) -> Self {
        Self {
            name: name.into(),
            memory_class,
            size,
            align: DEFAULT_ALIGN,
            required_resources: ResourceSet::EMPTY,
            always_present: false,
            dependencies: CapabilitySet::EMPTY,
            provides: CapabilitySet::EMPTY,
        }
    }

    /// Set the alignment.
    pub fn aligned_to(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    /// Add a required resource.
    pub fn requires(mut self, resource: ResourceId) -> Self {
        self.required_resources.insert(resource);
        self
    }

    /// Mark as always present.
    pub fn always_present(mut self) -> Self {
        self.always_present = true;
        self
    }

    /// Add a dependency on `capability`.
    pub fn depends_on(mut self, capability: CapabilityId) -> Self {
        self.dependencies.insert(capability);
        self
    }

    /// Offer `capability` to other subsystems.
    pub fn provides_capability(mut self, capability: CapabilityId) -> Self {
        self.provides.insert(capability);
        self
    }

    /// Footprint rounded up to the alignment.
    #[inline]
    pub fn aligned_size(&self) -> Option<usize> {
        if self.align == 0 || !self.align.is_power_of_two() {
            return None;
        }
        align_up(self.size, self.align)
    }

    /// Validate against the catalog and memory class table.
    ///
    /// # Errors
    /// Any footprint, alignment, class, resource, or always-present
    /// violation as a [`ConfigurationError`].
    pub fn validate(&self, catalog: &ResourceCatalog, classes: &[MemoryClassDef]) -> ConfigResult<()> {
        if self.size == 0 {
            return Err(ConfigurationError::EmptyFootprint {
                subsystem: self.name.clone(),
            });
        }
        if self.align == 0 || !self.align.is_power_of_two() || self.align > MAX_ALIGN {
            return Err(ConfigurationError::InvalidAlignment {
                subsystem: self.name.clone(),
                align: self.align,
            });
        }
        let class = classes
            .get(self.memory_class.index())
            .ok_or_else(|| ConfigurationError::UnknownMemoryClass {
                subsystem: self.name.clone(),
                class: self.memory_class.0,
            })?;
        let aligned = self.aligned_size().unwrap_or(usize::MAX);
        if aligned > class.capacity {
            return Err(ConfigurationError::SubsystemTooLarge {
                subsystem: self.name.clone(),
                size: self.size,
                capacity: class.capacity,
            });
        }
        if let Some(unknown) = self.required_resources.difference(catalog.all_resources()).first() {
            return Err(ConfigurationError::UnknownId {
                kind: "resource",
                index: unknown.index(),
            });
        }
        if self.dependencies.len() > MAX_DEPENDENCIES {
            return Err(ConfigurationError::LimitExceeded {
                kind: "dependencies per subsystem",
                max: MAX_DEPENDENCIES,
            });
        }
        if self.always_present {
            if let Some(mode) = catalog.modes().find(|m| !catalog.can_exist_in_mode(self, m.id)) {
                return Err(ConfigurationError::AlwaysPresentIncompatible {
                    subsystem: self.name.clone(),
                    mode: mode.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// One physical memory class and its capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryClassDef {
    /// Class id.
    pub id: MemoryClass,
    /// Unique name ("sram", "ccm", ...).
    pub name: String,
    /// Physical capacity in bytes.
    pub capacity: usize,
}

impl MemoryClassDef {
    /// Build the class table from `(name, capacity)` pairs.
    ///
    /// # Errors
    /// Duplicate names or more than [`MAX_MEMORY_CLASSES`] entries.
    pub fn table<'a>(entries: impl IntoIterator<Item = (&'a str, usize)>) -> ConfigResult<Vec<Self>> {
        let mut classes: Vec<Self> = Vec::new();
        for (name, capacity) in entries {
            if classes.iter().any(|c| c.name == name) {
                return Err(ConfigurationError::Duplicate {
                    kind: "memory class",
                    name: name.to_string(),
                });
            }
            if classes.len() >= MAX_MEMORY_CLASSES {
                return Err(ConfigurationError::LimitExceeded {
                    kind: "memory classes",
                    max: MAX_MEMORY_CLASSES,
                });
            }
            classes.push(Self {
                id: MemoryClass::from_index(classes.len()),
                name: name.to_string(),
                capacity,
            });
        }
        Ok(classes)
    }
}

/// Interned capability names.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapabilityTable {
    names: Vec<String>,
}

impl CapabilityTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, registering it on first use.
    pub fn intern(&mut self, name: &str) -> ConfigResult<CapabilityId> {
        if let Some(id) = self.id(name) {
            return Ok(id);
        }
        if self.names.len() >= MAX_CAPABILITIES {
            return Err(ConfigurationError::LimitExceeded {
                kind: "capabilities",
                max: MAX_CAPABILITIES,
            });
        }
        self.names.push(name.to_string());
        Ok(CapabilityId::from_index(self.names.len() - 1))
    }

    /// Existing id for `name`.
    pub fn id(&self, name: &str) -> Option<CapabilityId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(CapabilityId::from_index)
    }

    /// Name for logging; `"?"` for unknown ids.
    pub fn name(&self, id: CapabilityId) -> &str {
        self.names.get(id.index()).map_or("?", String::as_str)
    }

    /// Number of interned capabilities.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no capability is interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
