//! # EMBER Lifecycle Library
//!
//! Mode-aware subsystem lifecycle manager. Subsystems live in a fixed arena
//! planned by `ember_arena`; the manager constructs and destroys them in
//! place as the device changes operating mode, and keeps the dependency
//! registry in step.
//!
//! # Module Structure
//!
//! - [`builder`] - Subsystem registration, static checks, boot
//! - [`manager`] - `LifecycleManager`: transitions, `get`, diagnostics
//! - [`registry`] - Capability → provider bindings
//! - [`subsystem`] - `Subsystem` trait and in-place construction
//! - [`power`] - Power/resource control collaborator
//! - [`transition`] - Transition reports
//! - [`simulation`] - Hardware-free backend driven by `SystemConfig`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       ember_lifecycle                            │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌────────────────┐  │
//! │  │SystemBuilder │───►│ LifecycleManager │◄──►│ PowerControl   │  │
//! │  └──────────────┘    │  (RwLock state)  │    │ (collaborator) │  │
//! │                      └───┬──────────┬───┘    └────────────────┘  │
//! │                          │          │                            │
//! │                          ▼          ▼                            │
//! │                 ┌─────────────┐ ┌──────────────────┐             │
//! │                 │    Arena    │ │DependencyRegistry│             │
//! │                 │(ember_arena)│ └──────────────────┘             │
//! │                 └─────────────┘                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use ember_common::prelude::*;
//! use ember_lifecycle::prelude::*;
//!
//! struct Radio;
//! impl Subsystem for Radio {}
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut catalog = ResourceCatalog::builder();
//! let rf = catalog.resource("rf_clock")?;
//! let sleep = catalog.mode("sleep", &[])?;
//! let active = catalog.mode("active", &[rf])?;
//! let catalog = catalog.build(sleep, sleep)?;
//!
//! let classes = MemoryClassDef::table([("sram", 1024)])?;
//! let mut builder = SystemBuilder::new(catalog, classes, CapabilityTable::new());
//! let radio = builder.register_subsystem(
//!     SubsystemDescriptor::new("radio", MemoryClass(0), 64).requires(rf),
//!     |_: &Dependencies| Ok(Radio),
//! )?;
//!
//! let manager = builder.build(AlwaysOn, ManagerSettings::default())?;
//! assert!(manager.get(radio).is_none());
//!
//! let report = manager.transition_to(active)?;
//! assert!(report.is_complete());
//! assert!(manager.get_as::<Radio>(radio).is_some());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod builder;
pub mod manager;
pub mod power;
pub mod registry;
pub mod simulation;
pub mod subsystem;
pub mod transition;

// Re-export key types for convenience
pub use crate::builder::SystemBuilder;
pub use crate::manager::{LifecycleManager, ManagerSettings};
pub use crate::power::{AlwaysOn, PowerControl, PowerError};
pub use crate::registry::DependencyRegistry;
pub use crate::subsystem::{Dependencies, Subsystem, SubsystemError};
pub use crate::transition::{SubsystemFailure, TransitionOutcome, TransitionReport};

/// Common re-exports for subsystem authors.
pub mod prelude {
    pub use crate::builder::SystemBuilder;
    pub use crate::manager::{LifecycleManager, ManagerSettings};
    pub use crate::power::{AlwaysOn, PowerControl, PowerError};
    pub use crate::subsystem::{Dependencies, Subsystem, SubsystemError};
    pub use crate::transition::{TransitionOutcome, TransitionReport};
}
