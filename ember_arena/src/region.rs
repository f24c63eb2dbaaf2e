//! Memory regions and the immutable layout produced by the planner.

use serde::Serialize;

use ember_common::descriptor::MemoryClassDef;
use ember_common::ids::{MemoryClass, SubsystemId, SubsystemSet};

/// Index of a region in [`MemoryLayout::regions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RegionId(pub u8);

impl RegionId {
    /// Table index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A sub-range of one memory class arena.
///
/// One occupant: dedicated. More than one: union region whose members are
/// proven never simultaneously live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryRegion {
    /// Region id.
    pub id: RegionId,
    /// Memory class (arena) the region belongs to.
    pub class: MemoryClass,
    /// Byte offset inside the class arena (multiple of `align`).
    pub offset: usize,
    /// Byte length: the largest aligned footprint among occupants.
    pub size: usize,
    /// Largest alignment among occupants.
    pub align: usize,
    /// Subsystems that may be placed here (one at a time).
    pub occupants: SubsystemSet,
}

impl MemoryRegion {
    /// One past the last byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Shared by mutually exclusive subsystems.
    #[inline]
    pub fn is_union(&self) -> bool {
        self.occupants.len() > 1
    }

    /// Whether the two regions share at least one byte of the same arena.
    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        self.class == other.class && self.offset < other.end() && other.offset < self.end()
    }
}

/// Used/capacity figures for one memory class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    /// Bytes covered by regions, including alignment padding.
    pub used: usize,
    /// Physical capacity.
    pub capacity: usize,
}

/// Planner output: every region plus the subsystem → region map.
///
/// Immutable after planning.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryLayout {
    pub(crate) regions: Vec<MemoryRegion>,
    pub(crate) assignment: Vec<Option<RegionId>>,
    pub(crate) classes: Vec<MemoryClassDef>,
    pub(crate) usage: Vec<MemoryUsage>,
}

impl MemoryLayout {
    /// All regions, grouped by class, in offset order.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Region by id.
    pub fn region(&self, id: RegionId) -> Option<&MemoryRegion> {
        self.regions.get(id.index())
    }

    /// Region a subsystem is placed in. `None` for subsystems that are
    /// compatible with no mode (never constructed).
    pub fn region_of(&self, subsystem: SubsystemId) -> Option<&MemoryRegion> {
        self.assignment
            .get(subsystem.index())
            .copied()
            .flatten()
            .and_then(|id| self.region(id))
    }

    /// Regions of one memory class.
    pub fn regions_in(&self, class: MemoryClass) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter().filter(move |r| r.class == class)
    }

    /// Used/capacity of a memory class.
    pub fn usage(&self, class: MemoryClass) -> Option<MemoryUsage> {
        self.usage.get(class.index()).copied()
    }

    /// Memory class table the layout was planned against.
    pub fn classes(&self) -> &[MemoryClassDef] {
        &self.classes
    }

    /// Number of subsystems the layout covers.
    pub fn subsystem_count(&self) -> usize {
        self.assignment.len()
    }

    /// Total bytes used across all classes.
    pub fn total_used(&self) -> usize {
        self.usage.iter().map(|u| u.used).sum()
    }
}
