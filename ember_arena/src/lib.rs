//! # EMBER Arena
//!
//! Static memory planning for mode-aware subsystems. The crate turns the
//! static tables from `ember_common` into a fixed memory layout and owns the
//! byte buffers that back it.
//!
//! ## Features
//!
//! - **Overlay planning**: subsystems that are never live at the same time
//!   share one union region sized to the largest member
//! - **Dedicated regions**: always-present subsystems never share storage
//! - **Fail fast**: a layout exceeding a memory class capacity is rejected at
//!   planning time, never at runtime
//! - **No runtime allocation**: every buffer is allocated once, when the
//!   arena is created
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ ResourceCatalog │    │ MemoryMapPlanner│    │     Arena       │
//! │ Descriptors     ├───►│                 ├───►│                 │
//! │ MemoryClassDef  │    │ ConflictGraph   │    │ [sram][dtcm]..  │
//! └─────────────────┘    │ MemoryLayout    │    │ RegionView(Mut) │
//!                        └─────────────────┘    └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use ember_arena::{Arena, MemoryMapPlanner};
//! use ember_common::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut catalog = ResourceCatalog::builder();
//! let clock_fast = catalog.resource("clock_fast")?;
//! let bulk_mem = catalog.exclusive_resource("bulk_mem")?;
//! let idle = catalog.mode("idle", &[])?;
//! catalog.mode("work", &[clock_fast, bulk_mem])?;
//! let catalog = catalog.build(idle, idle)?;
//!
//! let classes = MemoryClassDef::table([("sram", 32 * 1024)])?;
//! let sram = MemoryClass(0);
//! let descriptors = [
//!     SubsystemDescriptor::new("core", sram, 2048).always_present(),
//!     SubsystemDescriptor::new("fast_io", sram, 3072).requires(clock_fast),
//!     SubsystemDescriptor::new("bulk_proc", sram, 20480).requires(bulk_mem),
//!     SubsystemDescriptor::new("bulk_video", sram, 15360).requires(bulk_mem),
//! ];
//!
//! let layout = MemoryMapPlanner::new(&catalog, &classes).plan(&descriptors)?;
//! assert_eq!(layout.usage(sram).map(|u| u.used), Some(25 * 1024));
//!
//! let arena = Arena::new(&layout);
//! let region = layout.region_of(SubsystemId(2)).ok_or("no region")?;
//! let view = arena.slice_for(region)?;
//! assert_eq!(view.len(), 20480);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - **MemoryLayout**: immutable, freely shared
//! - **Arena**: writes need `&mut`; the lifecycle manager guards it with a
//!   reader/writer lock

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod error;
pub mod planner;
pub mod region;

pub use arena::{Arena, RegionView, RegionViewMut};
pub use error::{ArenaError, ArenaResult};
pub use planner::{ConflictGraph, MemoryMapPlanner};
pub use region::{MemoryLayout, MemoryRegion, MemoryUsage, RegionId};

/// Render a layout as pretty-printed JSON (used by `ember plan --format json`).
pub fn layout_to_json(layout: &MemoryLayout) -> serde_json::Result<String> {
    serde_json::to_string_pretty(layout)
}
