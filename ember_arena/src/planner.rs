//! Memory map planning.
//!
//! Runs once, after every subsystem is registered and before the first mode
//! transition. The planner
//!
//! 1. builds a conflict graph over the subsystems that are not always
//!    present: an edge joins two subsystems that may be live at the same
//!    time (some mode permits both, and they do not compete for the same
//!    exclusive resource);
//! 2. gives every always-present subsystem a dedicated region;
//! 3. greedily groups the remaining subsystems of each memory class, largest
//!    aligned footprint first, into union regions whose members are pairwise
//!    non-adjacent in the conflict graph;
//! 4. concatenates the regions of each class with alignment padding and
//!    rejects a layout that exceeds the class capacity.
//!
//! Grouping is deterministic for a given registration order. It does not
//! search for the minimum number of regions, only for a correct overlay.

use tracing::{debug, info, warn};

use ember_common::catalog::ResourceCatalog;
use ember_common::consts::MAX_SUBSYSTEMS;
use ember_common::descriptor::{MemoryClassDef, SubsystemDescriptor, align_up};
use ember_common::error::{ConfigResult, ConfigurationError};
use ember_common::ids::{ModeSet, ResourceSet, SubsystemId, SubsystemSet};

use crate::region::{MemoryLayout, MemoryRegion, MemoryUsage, RegionId};

/// Which subsystems may be live simultaneously.
#[derive(Debug, Clone)]
pub struct ConflictGraph {
    adjacency: Vec<SubsystemSet>,
    compatible: Vec<ModeSet>,
}

impl ConflictGraph {
    /// Whether `a` and `b` may be live at the same time.
    pub fn conflicts(&self, a: SubsystemId, b: SubsystemId) -> bool {
        self.adjacency
            .get(a.index())
            .is_some_and(|set| set.contains(b))
    }

    /// Every subsystem `subsystem` may coexist with.
    pub fn neighbours(&self, subsystem: SubsystemId) -> SubsystemSet {
        self.adjacency
            .get(subsystem.index())
            .copied()
            .unwrap_or(SubsystemSet::EMPTY)
    }

    /// Modes `subsystem` may be live in.
    pub fn compatible_modes(&self, subsystem: SubsystemId) -> ModeSet {
        self.compatible
            .get(subsystem.index())
            .copied()
            .unwrap_or(ModeSet::EMPTY)
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|s| s.len()).sum::<usize>() / 2
    }
}

/// Computes the arena layout from the static tables.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMapPlanner<'a> {
    catalog: &'a ResourceCatalog,
    classes: &'a [MemoryClassDef],
}

impl<'a> MemoryMapPlanner<'a> {
    /// Planner over a catalog and memory class table.
    pub fn new(catalog: &'a ResourceCatalog, classes: &'a [MemoryClassDef]) -> Self {
        Self { catalog, classes }
    }

    /// Conflict graph over the non-always-present subsystems.
    ///
    /// Always-present subsystems get no edges; they never share a region.
    pub fn conflict_graph(&self, descriptors: &[SubsystemDescriptor]) -> ConflictGraph {
        let exclusive = self.catalog.exclusive_resources();
        let compatible: Vec<ModeSet> = descriptors
            .iter()
            .map(|d| self.catalog.compatible_modes(d))
            .collect();
        let mut adjacency = vec![SubsystemSet::EMPTY; descriptors.len()];

        for (i, a) in descriptors.iter().enumerate() {
            if a.always_present {
                continue;
            }
            for (j, b) in descriptors.iter().enumerate().skip(i + 1) {
                if b.always_present {
                    continue;
                }
                if may_coexist(a, compatible[i], b, compatible[j], exclusive) {
                    adjacency[i].insert(SubsystemId::from_index(j));
                    adjacency[j].insert(SubsystemId::from_index(i));
                }
            }
        }

        ConflictGraph {
            adjacency,
            compatible,
        }
    }

    /// Plan the layout.
    ///
    /// # Errors
    /// Any descriptor violation, more than [`MAX_SUBSYSTEMS`] descriptors, or
    /// [`ConfigurationError::CapacityExceeded`] when a class does not fit.
    pub fn plan(&self, descriptors: &[SubsystemDescriptor]) -> ConfigResult<MemoryLayout> {
        if descriptors.len() > MAX_SUBSYSTEMS {
            return Err(ConfigurationError::LimitExceeded {
                kind: "subsystems",
                max: MAX_SUBSYSTEMS,
            });
        }
        for descriptor in descriptors {
            descriptor.validate(self.catalog, self.classes)?;
        }

        let graph = self.conflict_graph(descriptors);
        let mut regions: Vec<MemoryRegion> = Vec::new();
        let mut assignment: Vec<Option<RegionId>> = vec![None; descriptors.len()];
        let mut usage = Vec::with_capacity(self.classes.len());

        for class in self.classes {
            let mut groups: Vec<SubsystemSet> = Vec::new();

            for (index, d) in descriptors.iter().enumerate() {
                if d.memory_class == class.id && d.always_present {
                    groups.push(SubsystemSet::EMPTY.with(SubsystemId::from_index(index)));
                }
            }

            let mut candidates: Vec<(usize, usize)> = Vec::new();
            for (index, d) in descriptors.iter().enumerate() {
                if d.memory_class != class.id || d.always_present {
                    continue;
                }
                let id = SubsystemId::from_index(index);
                if graph.compatible_modes(id).is_empty() {
                    warn!(
                        subsystem = %d.name,
                        "Subsystem is compatible with no mode; no region reserved"
                    );
                    continue;
                }
                candidates.push((aligned(d)?, index));
            }
            // Largest first, registration order among equals.
            candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let dedicated = groups.len();
            for &(_, index) in &candidates {
                let id = SubsystemId::from_index(index);
                let neighbours = graph.neighbours(id);
                match groups[dedicated..]
                    .iter_mut()
                    .find(|group| group.is_disjoint(neighbours))
                {
                    Some(group) => {
                        group.insert(id);
                    }
                    None => groups.push(SubsystemSet::EMPTY.with(id)),
                }
            }

            let mut cursor = 0usize;
            for occupants in groups {
                let mut size = 0usize;
                let mut align = 1usize;
                for member in occupants.iter() {
                    let d = &descriptors[member.index()];
                    size = size.max(aligned(d)?);
                    align = align.max(d.align);
                }
                let offset = align_up(cursor, align).ok_or_else(|| overflow(class))?;
                cursor = offset.checked_add(size).ok_or_else(|| overflow(class))?;

                let id = RegionId(regions.len() as u8);
                for member in occupants.iter() {
                    assignment[member.index()] = Some(id);
                }
                debug!(
                    class = %class.name,
                    region = id.0,
                    offset,
                    size,
                    align,
                    occupants = %occupants,
                    "Region planned"
                );
                regions.push(MemoryRegion {
                    id,
                    class: class.id,
                    offset,
                    size,
                    align,
                    occupants,
                });
            }

            if cursor > class.capacity {
                return Err(ConfigurationError::CapacityExceeded {
                    class: class.name.clone(),
                    required: cursor,
                    capacity: class.capacity,
                });
            }
            info!(
                class = %class.name,
                used = cursor,
                capacity = class.capacity,
                "Memory class planned"
            );
            usage.push(MemoryUsage {
                used: cursor,
                capacity: class.capacity,
            });
        }

        Ok(MemoryLayout {
            regions,
            assignment,
            classes: self.classes.to_vec(),
            usage,
        })
    }
}

/// Some mode permits both, and no exclusive resource keeps them apart.
fn may_coexist(
    a: &SubsystemDescriptor,
    a_modes: ModeSet,
    b: &SubsystemDescriptor,
    b_modes: ModeSet,
    exclusive: ResourceSet,
) -> bool {
    let contended = a
        .required_resources
        .intersection(b.required_resources)
        .intersection(exclusive);
    contended.is_empty() && !a_modes.is_disjoint(b_modes)
}

fn aligned(descriptor: &SubsystemDescriptor) -> ConfigResult<usize> {
    descriptor
        .aligned_size()
        .ok_or_else(|| ConfigurationError::InvalidAlignment {
            subsystem: descriptor.name.clone(),
            align: descriptor.align,
        })
}

fn overflow(class: &MemoryClassDef) -> ConfigurationError {
    ConfigurationError::CapacityExceeded {
        class: class.name.clone(),
        required: usize::MAX,
        capacity: class.capacity,
    }
}
