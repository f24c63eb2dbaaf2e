//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! and turn a [`SystemConfig`] into the static tables (catalog, memory
//! classes, descriptors) the planner and lifecycle manager consume.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ember_common::config::{ConfigLoader, ConfigError, SystemConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = SystemConfig::load(Path::new("ember.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::ResourceCatalog;
use crate::consts::{DEFAULT_ALIGN, DEFAULT_POWER_ENABLE_TIMEOUT_MS};
use crate::descriptor::{CapabilityTable, MemoryClassDef, SubsystemDescriptor};
use crate::error::{ConfigResult, ConfigurationError};
use crate::ids::MemoryClass;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigurationError> for ConfigError {
    fn from(err: ConfigurationError) -> Self {
        ConfigError::ValidationError(err.to_string())
    }
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields shared across all EMBER applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "ember-sensor-node"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── System configuration ───────────────────────────────────────────

fn default_align() -> usize {
    DEFAULT_ALIGN
}

fn default_power_timeout_ms() -> u64 {
    DEFAULT_POWER_ENABLE_TIMEOUT_MS
}

/// `[lifecycle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Mode entered at boot. Defaults to the first `[[mode]]`.
    #[serde(default)]
    pub boot_mode: Option<String>,
    /// Recovery mode. Defaults to the boot mode.
    #[serde(default)]
    pub fail_safe_mode: Option<String>,
    /// Timeout for a single resource enable call.
    #[serde(default = "default_power_timeout_ms")]
    pub power_enable_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            boot_mode: None,
            fail_safe_mode: None,
            power_enable_timeout_ms: DEFAULT_POWER_ENABLE_TIMEOUT_MS,
        }
    }
}

impl LifecycleConfig {
    /// Enable timeout as a `Duration`.
    pub fn power_enable_timeout(&self) -> Duration {
        Duration::from_millis(self.power_enable_timeout_ms)
    }
}

/// `[[memory_class]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryClassConfig {
    /// Class name.
    pub name: String,
    /// Physical capacity in bytes.
    pub capacity: usize,
}

/// `[[resource]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource name.
    pub name: String,
    /// At most one live holder.
    #[serde(default)]
    pub exclusive: bool,
}

/// `[[mode]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Mode name.
    pub name: String,
    /// Names of resources available in this mode.
    #[serde(default)]
    pub resources: Vec<String>,
}

/// `[[subsystem]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemConfig {
    /// Subsystem name.
    pub name: String,
    /// Memory class name.
    pub memory_class: String,
    /// Footprint in bytes.
    pub size: usize,
    /// Alignment in bytes.
    #[serde(default = "default_align")]
    pub align: usize,
    /// Live in every mode.
    #[serde(default)]
    pub always_present: bool,
    /// Required resource names.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Capability names this subsystem depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Capability names this subsystem provides.
    #[serde(default)]
    pub provides: Vec<String>,
    /// Simulation only: the constructor reports failure.
    #[serde(default)]
    pub fail_construction: bool,
}

/// Complete system description loaded from TOML.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "ember-demo"
///
/// [lifecycle]
/// boot_mode = "idle"
///
/// [[memory_class]]
/// name = "sram"
/// capacity = 32768
///
/// [[resource]]
/// name = "bulk_mem"
/// exclusive = true
///
/// [[mode]]
/// name = "idle"
///
/// [[mode]]
/// name = "work"
/// resources = ["bulk_mem"]
///
/// [[subsystem]]
/// name = "core"
/// memory_class = "sram"
/// size = 2048
/// always_present = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Shared service settings.
    pub shared: SharedConfig,
    /// Lifecycle settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Memory classes.
    #[serde(rename = "memory_class", default)]
    pub memory_classes: Vec<MemoryClassConfig>,
    /// Hardware resources.
    #[serde(rename = "resource", default)]
    pub resources: Vec<ResourceConfig>,
    /// Operating modes.
    #[serde(rename = "mode", default)]
    pub modes: Vec<ModeConfig>,
    /// Subsystem descriptors, in registration order.
    #[serde(rename = "subsystem", default)]
    pub subsystems: Vec<SubsystemConfig>,
}

impl SystemConfig {
    /// Validate the configuration by building every static table once.
    ///
    /// # Errors
    /// `ConfigError::ValidationError` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        let catalog = self.catalog()?;
        let classes = self.memory_class_table()?;
        let mut capabilities = CapabilityTable::new();
        self.descriptors(&catalog, &classes, &mut capabilities)?;
        Ok(())
    }

    /// Build the resource catalog.
    pub fn catalog(&self) -> ConfigResult<ResourceCatalog> {
        let mut builder = ResourceCatalog::builder();
        for resource in &self.resources {
            if resource.exclusive {
                builder.exclusive_resource(&resource.name)?;
            } else {
                builder.resource(&resource.name)?;
            }
        }

        let mut mode_names = Vec::with_capacity(self.modes.len());
        for mode in &self.modes {
            let resources = mode
                .resources
                .iter()
                .map(|name| self.resource_index(name))
                .collect::<ConfigResult<Vec<_>>>()?;
            builder.mode(&mode.name, &resources)?;
            mode_names.push(mode.name.as_str());
        }

        let lookup = |name: &str| {
            mode_names
                .iter()
                .position(|m| *m == name)
                .map(crate::ids::ModeId::from_index)
                .ok_or_else(|| ConfigurationError::UnknownName {
                    kind: "mode",
                    name: name.to_string(),
                })
        };
        let boot = match &self.lifecycle.boot_mode {
            Some(name) => lookup(name)?,
            None => crate::ids::ModeId(0),
        };
        let fail_safe = match &self.lifecycle.fail_safe_mode {
            Some(name) => lookup(name)?,
            None => boot,
        };
        builder.build(boot, fail_safe)
    }

    fn resource_index(&self, name: &str) -> ConfigResult<crate::ids::ResourceId> {
        self.resources
            .iter()
            .position(|r| r.name == name)
            .map(crate::ids::ResourceId::from_index)
            .ok_or_else(|| ConfigurationError::UnknownName {
                kind: "resource",
                name: name.to_string(),
            })
    }

    /// Build the memory class table.
    pub fn memory_class_table(&self) -> ConfigResult<Vec<MemoryClassDef>> {
        MemoryClassDef::table(self.memory_classes.iter().map(|c| (c.name.as_str(), c.capacity)))
    }

    /// Build validated descriptors in registration order, interning
    /// capability names into `capabilities`.
    pub fn descriptors(
        &self,
        catalog: &ResourceCatalog,
        classes: &[MemoryClassDef],
        capabilities: &mut CapabilityTable,
    ) -> ConfigResult<Vec<SubsystemDescriptor>> {
        let mut out: Vec<SubsystemDescriptor> = Vec::with_capacity(self.subsystems.len());
        for entry in &self.subsystems {
            if out.iter().any(|d| d.name == entry.name) {
                return Err(ConfigurationError::Duplicate {
                    kind: "subsystem",
                    name: entry.name.clone(),
                });
            }
            let class = classes
                .iter()
                .position(|c| c.name == entry.memory_class)
                .map(MemoryClass::from_index)
                .ok_or_else(|| ConfigurationError::UnknownName {
                    kind: "memory class",
                    name: entry.memory_class.clone(),
                })?;

            let mut descriptor =
                SubsystemDescriptor::new(entry.name.clone(), class, entry.size).aligned_to(entry.align);
            for name in &entry.requires {
                let resource = catalog.resource_id(name).ok_or_else(|| ConfigurationError::UnknownName {
                    kind: "resource",
                    name: name.clone(),
                })?;
                descriptor = descriptor.requires(resource);
            }
            for name in &entry.depends_on {
                descriptor = descriptor.depends_on(capabilities.intern(name)?);
            }
            for name in &entry.provides {
                descriptor = descriptor.provides_capability(capabilities.intern(name)?);
            }
            if entry.always_present {
                descriptor = descriptor.always_present();
            }
            descriptor.validate(catalog, classes)?;
            out.push(descriptor);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[shared]
service_name = "unit"

[lifecycle]
boot_mode = "idle"
power_enable_timeout_ms = 20

[[memory_class]]
name = "sram"
capacity = 4096

[[resource]]
name = "clock_fast"

[[resource]]
name = "bulk_mem"
exclusive = true

[[mode]]
name = "idle"

[[mode]]
name = "work"
resources = ["clock_fast", "bulk_mem"]

[[subsystem]]
name = "core"
memory_class = "sram"
size = 256
always_present = true
provides = ["core_services"]

[[subsystem]]
name = "fast_io"
memory_class = "sram"
size = 128
align = 16
requires = ["clock_fast"]
depends_on = ["core_services"]
"#;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"").unwrap().level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"warn\"").unwrap().level,
            LogLevel::Warn
        );
    }

    #[test]
    fn test_log_level_maps_to_tracing_level() {
        assert_eq!(tracing::Level::from(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = SystemConfig::load(Path::new("/nonexistent/path/ember.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = SystemConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_system_config_builds_tables() {
        let config = SystemConfig::from_toml(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.lifecycle.power_enable_timeout(), Duration::from_millis(20));

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.mode_count(), 2);
        assert_eq!(catalog.boot_mode(), catalog.mode_id("idle").unwrap());
        assert_eq!(catalog.fail_safe_mode(), catalog.boot_mode());
        assert!(catalog.exclusive_resources().contains(catalog.resource_id("bulk_mem").unwrap()));

        let classes = config.memory_class_table().unwrap();
        let mut caps = CapabilityTable::new();
        let descriptors = config.descriptors(&catalog, &classes, &mut caps).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors[0].always_present);
        assert_eq!(descriptors[1].align, 16);
        assert_eq!(descriptors[1].dependencies, descriptors[0].provides);
        assert_eq!(caps.name(caps.id("core_services").unwrap()), "core_services");
    }

    #[test]
    fn test_unknown_resource_name_rejected() {
        let text = SAMPLE.replace("requires = [\"clock_fast\"]", "requires = [\"warp_drive\"]");
        let config = SystemConfig::from_toml(&text).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(msg)) if msg.contains("warp_drive")));
    }

    #[test]
    fn test_unknown_boot_mode_rejected() {
        let text = SAMPLE.replace("boot_mode = \"idle\"", "boot_mode = \"sleep\"");
        let config = SystemConfig::from_toml(&text).unwrap();
        assert!(matches!(
            config.catalog(),
            Err(ConfigurationError::UnknownName { kind: "mode", .. })
        ));
    }
}
