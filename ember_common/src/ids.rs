//! Identifier newtypes and fixed-width id sets.
//!
//! Every static table entry (resource, mode, subsystem, capability, memory
//! class) is addressed by a small integer id equal to its registration
//! index. Sets of ids are single `u64` masks: set algebra is branch-free,
//! never allocates, and is available in `const` context so compatibility
//! checks can be evaluated at build time:
//!
//! ```rust
//! use ember_common::ids::{ResourceId, ResourceSet};
//! use static_assertions::const_assert;
//!
//! const CLOCK_FAST: ResourceId = ResourceId(0);
//! const BULK_MEM: ResourceId = ResourceId(1);
//! const WORK: ResourceSet = ResourceSet::EMPTY.with(CLOCK_FAST).with(BULK_MEM);
//! const FAST_IO_NEEDS: ResourceSet = ResourceSet::EMPTY.with(CLOCK_FAST);
//!
//! const_assert!(FAST_IO_NEEDS.is_subset_of(WORK));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u8);

        impl $name {
            /// Id for the table entry at `index`.
            ///
            /// # Panics
            /// Panics if `index` does not fit the id width.
            #[inline]
            pub const fn from_index(index: usize) -> Self {
                assert!(index <= u8::MAX as usize, "id index out of range");
                Self(index as u8)
            }

            /// Table index of this id.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

macro_rules! define_id_set {
    ($(#[$meta:meta])* $name:ident, $id:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// The empty set.
            pub const EMPTY: Self = Self(0);

            /// Set from a raw bit mask (bit `n` = id `n`).
            #[inline]
            pub const fn from_bits(bits: u64) -> Self {
                Self(bits)
            }

            /// Raw bit mask.
            #[inline]
            pub const fn bits(self) -> u64 {
                self.0
            }

            /// Set containing every id below `count`.
            #[inline]
            pub const fn first_n(count: usize) -> Self {
                if count >= 64 {
                    Self(u64::MAX)
                } else {
                    Self((1u64 << count) - 1)
                }
            }

            /// Copy of this set with `id` added.
            #[inline]
            pub const fn with(self, id: $id) -> Self {
                Self(self.0 | (1u64 << id.0))
            }

            /// Add `id`. Returns `true` if it was not present.
            #[inline]
            pub fn insert(&mut self, id: $id) -> bool {
                let was = self.contains(id);
                self.0 |= 1u64 << id.0;
                !was
            }

            /// Remove `id`. Returns `true` if it was present.
            #[inline]
            pub fn remove(&mut self, id: $id) -> bool {
                let was = self.contains(id);
                self.0 &= !(1u64 << id.0);
                was
            }

            /// Whether `id` is a member.
            #[inline]
            pub const fn contains(self, id: $id) -> bool {
                id.0 < 64 && self.0 & (1u64 << id.0) != 0
            }

            /// `self ⊆ other`.
            #[inline]
            pub const fn is_subset_of(self, other: Self) -> bool {
                self.0 & !other.0 == 0
            }

            /// `self ∪ other`.
            #[inline]
            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            /// `self ∩ other`.
            #[inline]
            pub const fn intersection(self, other: Self) -> Self {
                Self(self.0 & other.0)
            }

            /// `self − other`.
            #[inline]
            pub const fn difference(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }

            /// Whether the two sets share no member.
            #[inline]
            pub const fn is_disjoint(self, other: Self) -> bool {
                self.0 & other.0 == 0
            }

            /// Number of members.
            #[inline]
            pub const fn len(self) -> usize {
                self.0.count_ones() as usize
            }

            /// Whether the set has no members.
            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Smallest member, if any.
            #[inline]
            pub const fn first(self) -> Option<$id> {
                if self.0 == 0 {
                    None
                } else {
                    Some($id(self.0.trailing_zeros() as u8))
                }
            }

            /// Members in ascending id order.
            pub fn iter(self) -> impl DoubleEndedIterator<Item = $id> {
                (0u8..64).filter(move |bit| self.0 & (1u64 << bit) != 0).map($id)
            }
        }

        impl FromIterator<$id> for $name {
            fn from_iter<I: IntoIterator<Item = $id>>(iter: I) -> Self {
                let mut set = Self::EMPTY;
                for id in iter {
                    set.insert(id);
                }
                set
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("{")?;
                for (i, id) in self.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{id}")?;
                }
                f.write_str("}")
            }
        }
    };
}

define_id!(
    /// Hardware resource (clock domain, memory controller, power rail).
    ResourceId,
    "R"
);
define_id!(
    /// Operating mode.
    ModeId,
    "M"
);
define_id!(
    /// Registered subsystem. Equal to its registration index.
    SubsystemId,
    "S"
);
define_id!(
    /// Abstract dependency type a subsystem may provide or require.
    CapabilityId,
    "C"
);
define_id!(
    /// Memory class (one arena buffer per class).
    MemoryClass,
    "MC"
);

define_id_set!(
    /// Set of [`ResourceId`]s.
    ResourceSet,
    ResourceId
);
define_id_set!(
    /// Set of [`ModeId`]s.
    ModeSet,
    ModeId
);
define_id_set!(
    /// Set of [`SubsystemId`]s.
    SubsystemSet,
    SubsystemId
);
define_id_set!(
    /// Set of [`CapabilityId`]s.
    CapabilitySet,
    CapabilityId
);

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::const_assert;

    const A: ResourceId = ResourceId(0);
    const B: ResourceId = ResourceId(1);
    const AB: ResourceSet = ResourceSet::EMPTY.with(A).with(B);

    const_assert!(ResourceSet::EMPTY.is_subset_of(AB));
    const_assert!(ResourceSet::EMPTY.with(B).is_subset_of(AB));
    const_assert!(!AB.is_subset_of(ResourceSet::EMPTY.with(A)));

    #[test]
    fn insert_and_remove_report_membership_change() {
        let mut set = SubsystemSet::EMPTY;
        assert!(set.insert(SubsystemId(3)));
        assert!(!set.insert(SubsystemId(3)));
        assert!(set.contains(SubsystemId(3)));
        assert!(set.remove(SubsystemId(3)));
        assert!(!set.remove(SubsystemId(3)));
        assert!(set.is_empty());
    }

    #[test]
    fn set_algebra() {
        let x: SubsystemSet = [0u8, 1, 2].into_iter().map(SubsystemId).collect();
        let y: SubsystemSet = [2u8, 3].into_iter().map(SubsystemId).collect();

        assert_eq!(x.union(y).len(), 4);
        assert_eq!(x.intersection(y), SubsystemSet::EMPTY.with(SubsystemId(2)));
        assert_eq!(
            x.difference(y),
            SubsystemSet::EMPTY.with(SubsystemId(0)).with(SubsystemId(1))
        );
        assert!(!x.is_disjoint(y));
        assert!(x.difference(y).is_disjoint(y));
    }

    #[test]
    fn iter_is_ascending_and_reversible() {
        let set: CapabilitySet = [63u8, 5, 0].into_iter().map(CapabilityId).collect();
        let ids: Vec<_> = set.iter().collect();
        assert_eq!(ids, vec![CapabilityId(0), CapabilityId(5), CapabilityId(63)]);
        let rev: Vec<_> = set.iter().rev().collect();
        assert_eq!(rev, vec![CapabilityId(63), CapabilityId(5), CapabilityId(0)]);
        assert_eq!(set.first(), Some(CapabilityId(0)));
    }

    #[test]
    fn first_n_covers_full_width() {
        assert_eq!(ModeSet::first_n(0), ModeSet::EMPTY);
        assert_eq!(ModeSet::first_n(3).len(), 3);
        assert_eq!(ModeSet::first_n(64).len(), 64);
        assert!(ModeSet::first_n(64).contains(ModeId(63)));
    }

    #[test]
    fn display_lists_members() {
        let set = ResourceSet::EMPTY.with(ResourceId(1)).with(ResourceId(4));
        assert_eq!(set.to_string(), "{R1, R4}");
        assert_eq!(SubsystemId(7).to_string(), "S7");
    }

    #[test]
    fn out_of_range_id_is_never_contained() {
        assert!(!ResourceSet::from_bits(u64::MAX).contains(ResourceId(64)));
    }

    #[test]
    #[should_panic(expected = "id index out of range")]
    fn from_index_rejects_overflow() {
        let _ = ModeId::from_index(256);
    }
}
