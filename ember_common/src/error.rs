//! Error taxonomy shared by planner and lifecycle manager.
//!
//! Two tiers:
//! - [`ConfigurationError`]: raised while the static tables are being built
//!   or planned. Fatal: the system refuses to start.
//! - [`LifecycleError`]: the runtime taxonomy. Only `InvalidModeTransition`
//!   is returned as an `Err`; the per-subsystem variants are collected in a
//!   transition report and never abort a transition.

use serde::Serialize;
use thiserror::Error;

use crate::ids::{CapabilityId, ModeId, ResourceId};

/// Static table or layout violates a capacity, alignment, naming or
/// dependency constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ConfigurationError {
    /// Planned regions of a memory class exceed its physical capacity.
    #[error("memory class '{class}' needs {required} bytes, capacity is {capacity} bytes")]
    CapacityExceeded {
        /// Memory class name.
        class: String,
        /// Bytes required by the planned layout (including padding).
        required: usize,
        /// Configured physical capacity.
        capacity: usize,
    },

    /// A single subsystem does not fit its memory class on its own.
    #[error("subsystem '{subsystem}' ({size} bytes) exceeds memory class capacity of {capacity} bytes")]
    SubsystemTooLarge {
        /// Subsystem name.
        subsystem: String,
        /// Declared footprint.
        size: usize,
        /// Capacity of the subsystem's memory class.
        capacity: usize,
    },

    /// Alignment is zero, not a power of two, or above the supported maximum.
    #[error("subsystem '{subsystem}' has invalid alignment {align}")]
    InvalidAlignment {
        /// Subsystem name.
        subsystem: String,
        /// Offending alignment.
        align: usize,
    },

    /// Declared footprint is zero.
    #[error("subsystem '{subsystem}' declares an empty footprint")]
    EmptyFootprint {
        /// Subsystem name.
        subsystem: String,
    },

    /// Declared size/alignment is below what the concrete type needs.
    #[error(
        "subsystem '{subsystem}' declares {declared_size} bytes / align {declared_align}, \
         type needs {type_size} bytes / align {type_align}"
    )]
    FootprintTooSmall {
        /// Subsystem name.
        subsystem: String,
        /// Declared size.
        declared_size: usize,
        /// Declared alignment.
        declared_align: usize,
        /// `size_of` the concrete type.
        type_size: usize,
        /// `align_of` the concrete type.
        type_align: usize,
    },

    /// Descriptor references a memory class that is not configured.
    #[error("subsystem '{subsystem}' references unknown memory class {class}")]
    UnknownMemoryClass {
        /// Subsystem name.
        subsystem: String,
        /// Class index.
        class: u8,
    },

    /// A name lookup failed while building the tables.
    #[error("unknown {kind} '{name}'")]
    UnknownName {
        /// Table kind ("resource", "mode", ...).
        kind: &'static str,
        /// Name that was not found.
        name: String,
    },

    /// Id does not belong to the table it is used with.
    #[error("unknown {kind} id {index}")]
    UnknownId {
        /// Table kind.
        kind: &'static str,
        /// Raw id index.
        index: usize,
    },

    /// Two table entries share a name.
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// Table kind.
        kind: &'static str,
        /// Duplicated name.
        name: String,
    },

    /// A fixed table limit was exceeded.
    #[error("too many {kind} (max {max})")]
    LimitExceeded {
        /// Table kind.
        kind: &'static str,
        /// Limit.
        max: usize,
    },

    /// Catalog has no modes at all.
    #[error("catalog defines no modes")]
    NoModes,

    /// An always-present subsystem needs a resource some mode lacks.
    #[error("always-present subsystem '{subsystem}' cannot exist in mode '{mode}'")]
    AlwaysPresentIncompatible {
        /// Subsystem name.
        subsystem: String,
        /// Mode lacking a required resource.
        mode: String,
    },

    /// An always-present subsystem has a dependency no subsystem can provide
    /// in some mode.
    #[error("always-present subsystem '{subsystem}' has no provider for '{capability}' in mode '{mode}'")]
    AlwaysPresentUnresolvable {
        /// Subsystem name.
        subsystem: String,
        /// Capability name.
        capability: String,
        /// Mode without a provider.
        mode: String,
    },

    /// An always-present subsystem shares an exclusive resource with another
    /// subsystem, so it could lose the claim at runtime.
    #[error("always-present subsystem '{subsystem}' shares exclusive resource '{resource}' with '{other}'")]
    AlwaysPresentContended {
        /// Always-present subsystem name.
        subsystem: String,
        /// Exclusive resource name.
        resource: String,
        /// Competing subsystem name.
        other: String,
    },

    /// A dependency that no registered subsystem provides.
    #[error("subsystem '{subsystem}' depends on '{capability}', which nothing provides")]
    UnprovidedCapability {
        /// Subsystem name.
        subsystem: String,
        /// Capability name.
        capability: String,
    },

    /// The provides/depends graph contains a cycle.
    #[error("dependency cycle involving subsystem '{subsystem}'")]
    DependencyCycle {
        /// One subsystem on the cycle.
        subsystem: String,
    },
}

/// Runtime lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum LifecycleError {
    /// Static configuration is invalid. Never occurs after planning succeeded.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),

    /// Requested mode is not registered; state unchanged.
    #[error("invalid mode transition: mode {mode} is not registered")]
    InvalidModeTransition {
        /// Requested mode.
        mode: ModeId,
    },

    /// A resource could not be enabled (fault or timeout).
    #[error("resource {resource} unavailable: {reason}")]
    ResourceUnavailable {
        /// Resource that failed to come up.
        resource: ResourceId,
        /// Collaborator-provided reason.
        reason: &'static str,
    },

    /// A required capability has no bound provider.
    #[error("dependency {capability} unresolved")]
    DependencyUnresolved {
        /// Unbound capability.
        capability: CapabilityId,
    },

    /// The subsystem's own constructor reported failure.
    #[error("construction failed: {reason}")]
    ConstructionFailure {
        /// Constructor-provided reason.
        reason: &'static str,
    },
}

/// Result alias for table construction and planning.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_display() {
        let err = ConfigurationError::CapacityExceeded {
            class: "sram".to_string(),
            required: 4096,
            capacity: 2048,
        };
        let text = err.to_string();
        assert!(text.contains("sram"));
        assert!(text.contains("4096"));
    }

    #[test]
    fn configuration_error_converts_into_lifecycle_error() {
        let err: LifecycleError = ConfigurationError::NoModes.into();
        assert!(matches!(err, LifecycleError::InvalidConfiguration(ConfigurationError::NoModes)));
    }

    #[test]
    fn runtime_error_display() {
        let err = LifecycleError::ResourceUnavailable {
            resource: ResourceId(2),
            reason: "enable timed out",
        };
        assert_eq!(err.to_string(), "resource R2 unavailable: enable timed out");

        let err = LifecycleError::DependencyUnresolved {
            capability: CapabilityId(1),
        };
        assert!(err.to_string().contains("C1"));
    }
}
