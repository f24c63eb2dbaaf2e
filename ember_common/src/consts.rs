//! System-wide constants for the EMBER workspace.
//!
//! Single source of truth for all table limits and default paths.
//! Imported by all crates, no duplication permitted.

use static_assertions::const_assert;

/// Maximum number of hardware resources in a catalog (one bit per resource).
pub const MAX_RESOURCES: usize = 64;

/// Maximum number of operating modes.
pub const MAX_MODES: usize = 64;

/// Maximum number of registered subsystems.
pub const MAX_SUBSYSTEMS: usize = 64;

/// Maximum number of distinct capability (dependency) types.
pub const MAX_CAPABILITIES: usize = 64;

/// Maximum number of capabilities a single subsystem may depend on.
pub const MAX_DEPENDENCIES: usize = 16;

/// Maximum number of memory classes (SRAM, CCM, DTCM, ...).
pub const MAX_MEMORY_CLASSES: usize = 8;

/// Largest alignment a subsystem may request, in bytes (one cache line).
pub const MAX_ALIGN: usize = 64;

/// Default timeout for a single resource enable call, in milliseconds.
pub const DEFAULT_POWER_ENABLE_TIMEOUT_MS: u64 = 50;

/// Default subsystem alignment when a descriptor does not specify one.
pub const DEFAULT_ALIGN: usize = 8;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ember/ember.toml";

// Id sets are single u64 masks.
const_assert!(MAX_RESOURCES <= 64);
const_assert!(MAX_MODES <= 64);
const_assert!(MAX_SUBSYSTEMS <= 64);
const_assert!(MAX_CAPABILITIES <= 64);
const_assert!(MAX_DEPENDENCIES <= MAX_CAPABILITIES);
const_assert!(MAX_ALIGN.is_power_of_two());
const_assert!(DEFAULT_ALIGN <= MAX_ALIGN);
