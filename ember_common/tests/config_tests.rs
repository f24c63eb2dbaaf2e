//! System configuration loading tests.
//!
//! Loads TOML files from disk (the shipped sample and temporary files),
//! builds the static tables and checks name resolution and rejection of
//! invalid descriptors.

use ember_common::config::{ConfigError, ConfigLoader, SystemConfig};
use ember_common::descriptor::CapabilityTable;
use ember_common::error::ConfigurationError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/ember.toml")
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ember.toml");
    fs::write(&path, body).unwrap();
    path
}

const MINIMAL: &str = r#"
[shared]
service_name = "minimal"

[[memory_class]]
name = "sram"
capacity = 1024

[[mode]]
name = "only"
"#;

#[test]
fn shipped_sample_config_is_valid() {
    let config = SystemConfig::load(&sample_path()).expect("load sample");
    config.validate().expect("sample validates");

    let catalog = config.catalog().unwrap();
    let idle = catalog.mode_id("idle").unwrap();
    let work = catalog.mode_id("work").unwrap();
    assert_eq!(catalog.boot_mode(), idle);
    assert_eq!(catalog.fail_safe_mode(), idle);

    let classes = config.memory_class_table().unwrap();
    let mut caps = CapabilityTable::new();
    let descriptors = config.descriptors(&catalog, &classes, &mut caps).unwrap();
    let by_name = |name: &str| descriptors.iter().find(|d| d.name == name).unwrap();

    assert!(catalog.can_exist_in_mode(by_name("clock_lp"), idle));
    assert!(!catalog.can_exist_in_mode(by_name("clock_lp"), work));
    assert!(catalog.can_exist_in_mode(by_name("clock_hs"), work));
    assert!(catalog.can_exist_in_mode(by_name("logger"), idle));
    assert!(catalog.can_exist_in_mode(by_name("logger"), work));
}

#[test]
fn minimal_config_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), MINIMAL);
    let config = SystemConfig::load(&path).unwrap();
    config.validate().unwrap();

    assert!(config.subsystems.is_empty());
    assert!(config.resources.is_empty());
    let catalog = config.catalog().unwrap();
    assert_eq!(catalog.boot_mode(), catalog.mode_id("only").unwrap());
    assert_eq!(config.lifecycle.power_enable_timeout_ms, 50);
}

#[test]
fn missing_modes_rejected() {
    let body = r#"
[shared]
service_name = "no-modes"

[[memory_class]]
name = "sram"
capacity = 1024
"#;
    let config = SystemConfig::from_toml(body).unwrap();
    assert!(matches!(config.catalog(), Err(ConfigurationError::NoModes)));
    assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
}

#[test]
fn oversized_subsystem_rejected() {
    let body = format!(
        "{MINIMAL}\n[[subsystem]]\nname = \"big\"\nmemory_class = \"sram\"\nsize = 4096\n"
    );
    let config = SystemConfig::from_toml(&body).unwrap();
    let catalog = config.catalog().unwrap();
    let classes = config.memory_class_table().unwrap();
    let mut caps = CapabilityTable::new();
    assert!(matches!(
        config.descriptors(&catalog, &classes, &mut caps),
        Err(ConfigurationError::SubsystemTooLarge { .. })
    ));
}

#[test]
fn duplicate_subsystem_rejected() {
    let entry = "\n[[subsystem]]\nname = \"twin\"\nmemory_class = \"sram\"\nsize = 16\n";
    let body = format!("{MINIMAL}{entry}{entry}");
    let config = SystemConfig::from_toml(&body).unwrap();
    let catalog = config.catalog().unwrap();
    let classes = config.memory_class_table().unwrap();
    let mut caps = CapabilityTable::new();
    assert!(matches!(
        config.descriptors(&catalog, &classes, &mut caps),
        Err(ConfigurationError::Duplicate { kind: "subsystem", .. })
    ));
}

#[test]
fn unknown_memory_class_name_rejected() {
    let body = format!(
        "{MINIMAL}\n[[subsystem]]\nname = \"lost\"\nmemory_class = \"flash\"\nsize = 16\n"
    );
    let config = SystemConfig::from_toml(&body).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("flash"));
}
