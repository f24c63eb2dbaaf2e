//! EMBER Common Library
//!
//! This crate provides the static tables and shared vocabulary for all EMBER
//! workspace crates: identifiers, the resource catalog, subsystem
//! descriptors, the error taxonomy and configuration loading.
//!
//! # Module Structure
//!
//! - [`ids`] - Id newtypes and fixed-width id sets
//! - [`catalog`] - Resources, modes and the compatibility predicate
//! - [`descriptor`] - Subsystem descriptors, memory classes, capabilities
//! - [`error`] - Configuration and lifecycle error taxonomy
//! - [`config`] - TOML configuration loading
//! - [`consts`] - Table limits and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ember_common::prelude::*;
//!
//! let mut catalog = ResourceCatalog::builder();
//! let clock = catalog.resource("clock_fast").unwrap();
//! let idle = catalog.mode("idle", &[]).unwrap();
//! let work = catalog.mode("work", &[clock]).unwrap();
//! let catalog = catalog.build(idle, idle).unwrap();
//!
//! let fast_io = SubsystemDescriptor::new("fast_io", MemoryClass(0), 3072).requires(clock);
//! assert!(catalog.can_exist_in_mode(&fast_io, work));
//! assert!(!catalog.can_exist_in_mode(&fast_io, idle));
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod error;
pub mod ids;
pub mod prelude;
