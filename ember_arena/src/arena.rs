//! Fixed arena buffers, one per memory class.
//!
//! Each buffer is allocated exactly once, when the arena is created from a
//! planned [`MemoryLayout`], and is never resized. Storage is a slice of
//! cache-line sized blocks, so the base of every buffer satisfies the
//! largest supported alignment and a region offset that is a multiple of
//! the region alignment yields an aligned address.
//!
//! The arena does not interpret region contents. Views hand out raw
//! pointers; the lifecycle manager is the only writer.

use std::marker::PhantomData;
use std::mem::{MaybeUninit, align_of, size_of};
use std::ptr::NonNull;

use static_assertions::const_assert_eq;
use tracing::debug;

use ember_common::consts::MAX_ALIGN;
use ember_common::ids::MemoryClass;

use crate::error::{ArenaError, ArenaResult};
use crate::region::{MemoryLayout, MemoryRegion};

/// Storage unit of an arena buffer.
#[repr(C, align(64))]
#[derive(Clone, Copy)]
struct ArenaBlock([u8; MAX_ALIGN]);

const_assert_eq!(size_of::<ArenaBlock>(), MAX_ALIGN);
const_assert_eq!(align_of::<ArenaBlock>(), MAX_ALIGN);

struct ClassBuffer {
    class: MemoryClass,
    len: usize,
    storage: Box<[MaybeUninit<ArenaBlock>]>,
}

impl ClassBuffer {
    fn new(class: MemoryClass, len: usize) -> Self {
        Self {
            class,
            len,
            storage: Box::new_uninit_slice(len.div_ceil(MAX_ALIGN)),
        }
    }

    fn check(&self, region: &MemoryRegion) -> ArenaResult<()> {
        if region.align == 0 || region.offset % region.align != 0 {
            return Err(ArenaError::AlignmentError {
                offset: region.offset,
                alignment: region.align,
            });
        }
        if region.end() > self.len {
            return Err(ArenaError::OutOfBounds {
                region: region.id,
                class: self.class,
                offset: region.offset,
                end: region.end(),
                capacity: self.len,
            });
        }
        Ok(())
    }
}

/// The fixed byte buffers backing all subsystem storage.
pub struct Arena {
    buffers: Vec<ClassBuffer>,
}

impl Arena {
    /// Allocate one buffer per memory class, sized to the planned usage.
    pub fn new(layout: &MemoryLayout) -> Self {
        let buffers = layout
            .classes()
            .iter()
            .map(|class| {
                let len = layout.usage(class.id).map_or(0, |u| u.used);
                debug!(class = %class.name, bytes = len, "Arena buffer allocated");
                ClassBuffer::new(class.id, len)
            })
            .collect();
        Self { buffers }
    }

    /// Length in bytes of a class buffer.
    pub fn len_of(&self, class: MemoryClass) -> Option<usize> {
        self.buffers.get(class.index()).map(|b| b.len)
    }

    /// Total bytes across all buffers.
    pub fn total_len(&self) -> usize {
        self.buffers.iter().map(|b| b.len).sum()
    }

    fn buffer(&self, class: MemoryClass) -> ArenaResult<&ClassBuffer> {
        self.buffers
            .get(class.index())
            .ok_or(ArenaError::UnknownClass { class })
    }

    /// Read-only view of a region's storage.
    ///
    /// # Errors
    /// The region does not belong to this arena's classes, is misaligned,
    /// or exceeds the buffer.
    pub fn slice_for(&self, region: &MemoryRegion) -> ArenaResult<RegionView<'_>> {
        let buffer = self.buffer(region.class)?;
        buffer.check(region)?;
        let base = buffer.storage.as_ptr().cast::<u8>().cast_mut();
        // SAFETY: `check` proved offset + size <= len <= allocation size, and
        // a boxed slice pointer is never null.
        let ptr = unsafe { NonNull::new_unchecked(base.add(region.offset)) };
        Ok(RegionView {
            ptr,
            len: region.size,
            align: region.align,
            _arena: PhantomData,
        })
    }

    /// Writable view of a region's storage.
    ///
    /// # Errors
    /// Same conditions as [`Arena::slice_for`].
    pub fn slice_for_mut(&mut self, region: &MemoryRegion) -> ArenaResult<RegionViewMut<'_>> {
        let class = region.class;
        let buffer = self
            .buffers
            .get_mut(class.index())
            .ok_or(ArenaError::UnknownClass { class })?;
        buffer.check(region)?;
        let base = buffer.storage.as_mut_ptr().cast::<u8>();
        // SAFETY: as in `slice_for`.
        let ptr = unsafe { NonNull::new_unchecked(base.add(region.offset)) };
        Ok(RegionViewMut {
            ptr,
            len: region.size,
            align: region.align,
            _arena: PhantomData,
        })
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.buffers.iter().map(|b| (b.class, b.len)))
            .finish()
    }
}

/// Shared, uninterpreted view of one region.
#[derive(Debug, Clone, Copy)]
pub struct RegionView<'a> {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
    _arena: PhantomData<&'a Arena>,
}

impl RegionView<'_> {
    /// Start of the region.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is zero bytes long.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment guaranteed for [`as_ptr`](Self::as_ptr).
    pub fn align(&self) -> usize {
        self.align
    }
}

/// Exclusive, uninterpreted view of one region.
#[derive(Debug)]
pub struct RegionViewMut<'a> {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
    _arena: PhantomData<&'a mut Arena>,
}

impl RegionViewMut<'_> {
    /// Start of the region.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is zero bytes long.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment guaranteed for [`as_mut_ptr`](Self::as_mut_ptr).
    pub fn align(&self) -> usize {
        self.align
    }

    /// Whether a value of `size` bytes and alignment `align` fits here.
    pub fn fits(&self, size: usize, align: usize) -> bool {
        size <= self.len && align <= self.align
    }
}

// SAFETY: views are plain addresses into a buffer borrowed from the arena;
// the borrow enforces the usual shared/exclusive rules.
unsafe impl Send for RegionView<'_> {}
unsafe impl Sync for RegionView<'_> {}
unsafe impl Send for RegionViewMut<'_> {}
