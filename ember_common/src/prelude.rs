//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use ember_common::prelude::*;` and get
//! the most important types without listing individual paths.

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig, SystemConfig};

// ─── Static tables ──────────────────────────────────────────────────
pub use crate::catalog::{can_exist, ResourceCatalog};
pub use crate::descriptor::{CapabilityTable, MemoryClassDef, SubsystemDescriptor};

// ─── Identifiers ────────────────────────────────────────────────────
pub use crate::ids::{
    CapabilityId, CapabilitySet, MemoryClass, ModeId, ModeSet, ResourceId, ResourceSet,
    SubsystemId, SubsystemSet,
};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{ConfigResult, ConfigurationError, LifecycleError};
