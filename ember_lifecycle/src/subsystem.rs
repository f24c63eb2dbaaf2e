//! Subsystem contract and in-place construction.
//!
//! Concrete subsystems implement [`Subsystem`] and are registered together
//! with a constructor closure. The manager places the value directly in the
//! subsystem's arena region and drops it there; nothing is boxed.
//!
//! # Lifecycle
//!
//! | Step | Called by | When |
//! |------|-----------|------|
//! | constructor | `transition_to` | subsystem becomes live, dependencies resolved |
//! | `refresh()` | `transition_to` | subsystem stays live, a dependency's provider changed |
//! | `teardown()` | `transition_to`, manager drop | before the value is dropped in place |

use std::alloc::Layout;
use std::any::TypeId;
use std::marker::PhantomData;

use heapless::Vec as HVec;
use thiserror::Error;

use ember_common::consts::MAX_DEPENDENCIES;
use ember_common::ids::{CapabilityId, SubsystemId};

/// Failure reported by a subsystem constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SubsystemError {
    /// Static description, so reporting never allocates.
    pub reason: &'static str,
}

impl SubsystemError {
    /// Error with the given reason.
    pub const fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// A component managed by the lifecycle manager.
///
/// Instances live inside arena storage, so they must be `'static` and may be
/// read from several threads through [`get`](crate::LifecycleManager::get).
pub trait Subsystem: Send + Sync + 'static {
    /// The provider of `capability` changed while this subsystem stayed live.
    fn refresh(&mut self, capability: CapabilityId, provider: SubsystemId) {
        let _ = (capability, provider);
    }

    /// Release external state. Called once, right before the value is
    /// dropped in place.
    fn teardown(&mut self) {}
}

/// Resolved dependencies handed to a constructor.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    resolved: HVec<(CapabilityId, SubsystemId), MAX_DEPENDENCIES>,
}

impl Dependencies {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved dependency. Returns `false` when full.
    pub fn push(&mut self, capability: CapabilityId, provider: SubsystemId) -> bool {
        self.resolved.push((capability, provider)).is_ok()
    }

    /// Provider bound to `capability`.
    pub fn provider(&self, capability: CapabilityId) -> Option<SubsystemId> {
        self.resolved
            .iter()
            .find(|(cap, _)| *cap == capability)
            .map(|&(_, provider)| provider)
    }

    /// `(capability, provider)` pairs in capability order.
    pub fn iter(&self) -> impl Iterator<Item = (CapabilityId, SubsystemId)> + '_ {
        self.resolved.iter().copied()
    }

    /// Number of resolved dependencies.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Whether there are none.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Type-erased construct/destroy-in-place operations for one subsystem type.
pub(crate) trait ErasedConstructor: Send + Sync {
    fn layout(&self) -> Layout;

    fn instance_type(&self) -> TypeId;

    fn type_name(&self) -> &'static str;

    /// Run the constructor and move the value to `dst`.
    ///
    /// # Safety
    /// `dst` must be valid for writes of `layout().size()` bytes, aligned to
    /// `layout().align()`, and must not hold a live value.
    unsafe fn construct_in_place(&self, dst: *mut u8, deps: &Dependencies) -> Result<(), SubsystemError>;

    /// Fat pointer to the value stored at `ptr`.
    fn as_dyn(&self, ptr: *mut u8) -> *mut dyn Subsystem;
}

struct TypedConstructor<T, F> {
    ctor: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> ErasedConstructor for TypedConstructor<T, F>
where
    T: Subsystem,
    F: Fn(&Dependencies) -> Result<T, SubsystemError> + Send + Sync + 'static,
{
    fn layout(&self) -> Layout {
        Layout::new::<T>()
    }

    fn instance_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    unsafe fn construct_in_place(&self, dst: *mut u8, deps: &Dependencies) -> Result<(), SubsystemError> {
        let value = (self.ctor)(deps)?;
        // SAFETY: guaranteed by the caller.
        unsafe { dst.cast::<T>().write(value) };
        Ok(())
    }

    fn as_dyn(&self, ptr: *mut u8) -> *mut dyn Subsystem {
        ptr.cast::<T>() as *mut dyn Subsystem
    }
}

/// Erase a typed constructor.
pub(crate) fn erase<T, F>(ctor: F) -> Box<dyn ErasedConstructor>
where
    T: Subsystem,
    F: Fn(&Dependencies) -> Result<T, SubsystemError> + Send + Sync + 'static,
{
    Box::new(TypedConstructor {
        ctor,
        _marker: PhantomData,
    })
}
