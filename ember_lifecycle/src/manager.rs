//! Lifecycle manager: mode transitions and live subsystem access.
//!
//! The manager owns the arena, the dependency registry and the power
//! collaborator. Static tables are read without locking; the mutable state
//! sits behind a reader/writer lock:
//!
//! - `transition_to` takes the write lock for the whole transition, so
//!   transitions are serialized and `get` never observes a half-built state.
//! - `get`/`get_as` take the read lock and return a mapped guard; many
//!   readers may hold handles at once between transitions.
//!
//! Every arena region is always either empty or holds one fully constructed
//! instance. A failing subsystem is left out of the active set and listed in
//! the [`TransitionReport`]; it never aborts the transition.

use std::any::TypeId;
use std::time::{Duration, Instant};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use tracing::{debug, info, warn};

use ember_arena::{Arena, MemoryLayout, MemoryRegion, MemoryUsage};
use ember_common::catalog::ResourceCatalog;
use ember_common::config::LifecycleConfig;
use ember_common::consts::{
    DEFAULT_POWER_ENABLE_TIMEOUT_MS, MAX_CAPABILITIES, MAX_RESOURCES, MAX_SUBSYSTEMS,
};
use ember_common::descriptor::{CapabilityTable, SubsystemDescriptor};
use ember_common::error::LifecycleError;
use ember_common::ids::{
    CapabilityId, MemoryClass, ModeId, ModeSet, ResourceId, ResourceSet, SubsystemId,
    SubsystemSet,
};

use crate::power::PowerControl;
use crate::registry::DependencyRegistry;
use crate::subsystem::{Dependencies, ErasedConstructor, Subsystem};
use crate::transition::TransitionReport;

/// Runtime knobs for the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Upper bound for a single resource enable call.
    pub power_enable_timeout: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            power_enable_timeout: Duration::from_millis(DEFAULT_POWER_ENABLE_TIMEOUT_MS),
        }
    }
}

impl From<&LifecycleConfig> for ManagerSettings {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            power_enable_timeout: config.power_enable_timeout(),
        }
    }
}

/// Read-only tables fixed at build time.
pub(crate) struct SystemTables {
    pub(crate) catalog: ResourceCatalog,
    pub(crate) capabilities: CapabilityTable,
    pub(crate) descriptors: Vec<SubsystemDescriptor>,
    pub(crate) constructors: Vec<Box<dyn ErasedConstructor>>,
    pub(crate) compatible: Vec<ModeSet>,
    pub(crate) layout: MemoryLayout,
    /// Providers before dependents.
    pub(crate) order: Vec<SubsystemId>,
    pub(crate) settings: ManagerSettings,
}

/// Mutable state guarded by the transition lock.
pub(crate) struct ManagerState {
    mode: Option<ModeId>,
    active: SubsystemSet,
    arena: Arena,
    /// Current occupant per region.
    occupants: Vec<Option<SubsystemId>>,
    registry: DependencyRegistry,
    enabled: ResourceSet,
    last_report: Option<TransitionReport>,
    transitions: u64,
}

impl ManagerState {
    pub(crate) fn new(layout: &MemoryLayout) -> Self {
        Self {
            mode: None,
            active: SubsystemSet::EMPTY,
            arena: Arena::new(layout),
            occupants: vec![None; layout.regions().len()],
            registry: DependencyRegistry::new(),
            enabled: ResourceSet::EMPTY,
            last_report: None,
            transitions: 0,
        }
    }
}

/// Pure result of the targeting step.
struct TransitionPlan {
    targets: SubsystemSet,
    providers: [Option<SubsystemId>; MAX_CAPABILITIES],
    /// Targets dropped because a dependency has no provider in the mode.
    unresolved: [Option<CapabilityId>; MAX_SUBSYSTEMS],
}

impl SystemTables {
    fn descriptor(&self, id: SubsystemId) -> &SubsystemDescriptor {
        &self.descriptors[id.index()]
    }

    fn name(&self, id: SubsystemId) -> &str {
        self.descriptors
            .get(id.index())
            .map_or("?", |d| d.name.as_str())
    }

    /// Which subsystems the mode should run, and who provides what.
    ///
    /// A claimant pruned for an unresolved dependency releases its union
    /// region and exclusive resources to the next viable claimant.
    fn plan(&self, mode: ModeId) -> TransitionPlan {
        let mut excluded = SubsystemSet::EMPTY;
        let mut excluded_caps = [None; MAX_SUBSYSTEMS];
        loop {
            let claimants = self.claimants(mode, excluded);
            let mut targets = claimants;
            let mut unresolved = excluded_caps;
            let providers = loop {
                let providers = self.providers_among(targets);
                let mut pruned = false;
                for id in targets.iter() {
                    let missing = self
                        .descriptor(id)
                        .dependencies
                        .iter()
                        .find(|cap| providers[cap.index()].is_none());
                    if let Some(cap) = missing {
                        targets.remove(id);
                        unresolved[id.index()] = Some(cap);
                        pruned = true;
                    }
                }
                if !pruned {
                    break providers;
                }
            };

            let dropped = claimants.difference(targets);
            let newcomers = self
                .claimants(mode, excluded.union(dropped))
                .difference(claimants);
            let blockers: SubsystemSet = dropped
                .iter()
                .filter(|&p| newcomers.iter().any(|q| self.contends(p, q)))
                .collect();
            if blockers.is_empty() {
                return TransitionPlan {
                    targets,
                    providers,
                    unresolved,
                };
            }
            for id in blockers.iter() {
                excluded_caps[id.index()] = unresolved[id.index()];
            }
            excluded = excluded.union(blockers);
        }
    }

    /// Compatible, placed subsystems that win their claims. Earlier
    /// registration wins an exclusive resource or a union region.
    fn claimants(&self, mode: ModeId, excluded: SubsystemSet) -> SubsystemSet {
        let exclusive = self.catalog.exclusive_resources();
        let mut claimants = SubsystemSet::EMPTY;
        let mut claimed = ResourceSet::EMPTY;
        let mut claimed_regions = 0u64;

        for (index, descriptor) in self.descriptors.iter().enumerate() {
            let id = SubsystemId::from_index(index);
            if excluded.contains(id) || !self.compatible[index].contains(mode) {
                continue;
            }
            let Some(region) = self.layout.region_of(id) else {
                continue;
            };
            let held = descriptor.required_resources.intersection(exclusive);
            let region_bit = 1u64 << region.id.0;
            if !held.is_disjoint(claimed) || claimed_regions & region_bit != 0 {
                continue;
            }
            claimed = claimed.union(held);
            claimed_regions |= region_bit;
            claimants.insert(id);
        }
        claimants
    }

    /// Whether `a` and `b` compete for a region or an exclusive resource.
    fn contends(&self, a: SubsystemId, b: SubsystemId) -> bool {
        let same_region = match (self.region(a), self.region(b)) {
            (Some(ra), Some(rb)) => ra.id == rb.id,
            _ => false,
        };
        let exclusive = self.catalog.exclusive_resources();
        let shared = self
            .descriptor(a)
            .required_resources
            .intersection(self.descriptor(b).required_resources)
            .intersection(exclusive);
        same_region || !shared.is_empty()
    }

    /// Earliest-registered provider of each capability within `set`.
    fn providers_among(&self, set: SubsystemSet) -> [Option<SubsystemId>; MAX_CAPABILITIES] {
        let mut providers = [None; MAX_CAPABILITIES];
        for id in set.iter() {
            for cap in self.descriptor(id).provides.iter() {
                let slot = &mut providers[cap.index()];
                if slot.is_none() {
                    *slot = Some(id);
                }
            }
        }
        providers
    }

    fn region(&self, id: SubsystemId) -> Option<&MemoryRegion> {
        self.layout.region_of(id)
    }

    /// Live instance of `id`, borrowed from the arena.
    fn instance<'s>(&self, state: &'s ManagerState, id: SubsystemId) -> Option<&'s (dyn Subsystem + 'static)> {
        let ptr = self.instance_ptr(state, id)?;
        // SAFETY: the region holds a fully constructed value of this
        // subsystem's type while `id` is active; the shared borrow of the
        // state prevents concurrent mutation.
        Some(unsafe { &*self.constructors[id.index()].as_dyn(ptr) })
    }

    fn instance_mut<'s>(
        &self,
        state: &'s mut ManagerState,
        id: SubsystemId,
    ) -> Option<&'s mut (dyn Subsystem + 'static)> {
        if !state.active.contains(id) {
            return None;
        }
        let region = self.region(id)?;
        let mut view = state.arena.slice_for_mut(region).ok()?;
        let ptr = view.as_mut_ptr();
        // SAFETY: as in `instance`; the exclusive borrow of the state makes
        // this the only reference.
        Some(unsafe { &mut *self.constructors[id.index()].as_dyn(ptr) })
    }

    fn instance_ptr(&self, state: &ManagerState, id: SubsystemId) -> Option<*mut u8> {
        if !state.active.contains(id) {
            return None;
        }
        let region = self.region(id)?;
        let view = state.arena.slice_for(region).ok()?;
        Some(view.as_ptr().cast_mut())
    }

    /// Tear down and drop `id` in place, freeing its region and bindings.
    fn destroy(&self, state: &mut ManagerState, id: SubsystemId) {
        let Some(region) = self.region(id) else {
            return;
        };
        if let Some(instance) = self.instance_mut(state, id) {
            instance.teardown();
            // SAFETY: the value is live and is not used again; the region is
            // marked empty right after.
            unsafe { std::ptr::drop_in_place(instance as *mut dyn Subsystem) };
        }
        state.occupants[region.id.index()] = None;
        state.active.remove(id);
        let released = state.registry.unbind_provider(id);
        debug!(subsystem = self.name(id), released = %released, "Subsystem destroyed");
    }

    /// Resolve dependencies and construct `id` in its region.
    fn construct(&self, state: &mut ManagerState, id: SubsystemId) -> Result<(), LifecycleError> {
        let descriptor = self.descriptor(id);
        let mut deps = Dependencies::new();
        for cap in descriptor.dependencies.iter() {
            let provider = state.registry.resolve(cap)?;
            deps.push(cap, provider);
        }

        let region = self.region(id).ok_or(LifecycleError::ConstructionFailure {
            reason: "no region planned",
        })?;
        if state.occupants[region.id.index()].is_some() {
            return Err(LifecycleError::ConstructionFailure {
                reason: "region occupied",
            });
        }
        let mut view = state
            .arena
            .slice_for_mut(region)
            .map_err(|_| LifecycleError::ConstructionFailure {
                reason: "region outside arena",
            })?;
        let ctor = &self.constructors[id.index()];
        let layout = ctor.layout();
        if !view.fits(layout.size(), layout.align()) {
            return Err(LifecycleError::ConstructionFailure {
                reason: "region too small for type",
            });
        }
        // SAFETY: the region is empty, large and aligned enough for the
        // type, and exclusively borrowed.
        unsafe { ctor.construct_in_place(view.as_mut_ptr(), &deps) }
            .map_err(|e| LifecycleError::ConstructionFailure { reason: e.reason })?;

        state.occupants[region.id.index()] = Some(id);
        state.active.insert(id);
        debug!(
            subsystem = self.name(id),
            ty = ctor.type_name(),
            region = region.id.0,
            "Subsystem constructed"
        );
        Ok(())
    }

    /// Bind capabilities `id` is the planned provider of, or that are unbound.
    fn bind_provides(&self, state: &mut ManagerState, plan: &TransitionPlan, id: SubsystemId) {
        for cap in self.descriptor(id).provides.iter() {
            let planned = plan.providers[cap.index()] == Some(id);
            if planned || state.registry.provider(cap).is_none() {
                state.registry.bind(cap, id);
            }
        }
    }
}

/// Orchestrates mode transitions over a fixed arena.
///
/// Built by [`SystemBuilder::build`](crate::SystemBuilder::build), which also
/// performs the boot transition.
pub struct LifecycleManager {
    tables: SystemTables,
    state: RwLock<ManagerState>,
    power: Mutex<Box<dyn PowerControl>>,
}

impl LifecycleManager {
    pub(crate) fn new(tables: SystemTables, power: Box<dyn PowerControl>) -> Self {
        let state = ManagerState::new(&tables.layout);
        Self {
            tables,
            state: RwLock::new(state),
            power: Mutex::new(power),
        }
    }

    /// Switch to `mode`.
    ///
    /// Destroys subsystems that cannot stay live (dependents first), updates
    /// resource power, constructs newly compatible subsystems (providers
    /// first) and refreshes kept subsystems whose providers changed.
    /// Per-subsystem failures are reported, not returned.
    ///
    /// Requesting the current mode again is a no-op unless the previous
    /// attempt left subsystems out, which are then retried.
    ///
    /// # Errors
    /// [`LifecycleError::InvalidModeTransition`] for an unregistered mode;
    /// nothing is changed.
    pub fn transition_to(&self, mode: ModeId) -> Result<TransitionReport, LifecycleError> {
        let tables = &self.tables;
        let Some(available) = tables.catalog.resources_available(mode) else {
            warn!(mode = %mode, "Transition to unknown mode rejected");
            return Err(LifecycleError::InvalidModeTransition { mode });
        };

        let started = Instant::now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        let mut report = TransitionReport::new(state.mode, mode);

        let plan = tables.plan(mode);
        let to_destroy = state.active.difference(plan.targets);
        let to_create = plan.targets.difference(state.active);
        let to_keep = plan.targets.intersection(state.active);
        for (index, cap) in plan.unresolved.iter().enumerate() {
            if let Some(capability) = *cap {
                report.record(
                    SubsystemId::from_index(index),
                    LifecycleError::DependencyUnresolved { capability },
                );
            }
        }
        state.registry.checkpoint();

        // Dependents first.
        for &id in tables.order.iter().rev() {
            if to_destroy.contains(id) {
                tables.destroy(state, id);
                report.destroyed.insert(id);
            }
        }

        let mut resource_errors: [Option<&'static str>; MAX_RESOURCES] = [None; MAX_RESOURCES];
        {
            let mut power = self.power.lock();
            for resource in state.enabled.difference(available).iter() {
                power.disable(resource);
                state.enabled.remove(resource);
                debug!(resource = tables.catalog.resource_name(resource), "Resource disabled");
            }
            for resource in available.difference(state.enabled).iter() {
                match power.enable(resource, tables.settings.power_enable_timeout) {
                    Ok(()) => {
                        state.enabled.insert(resource);
                        debug!(resource = tables.catalog.resource_name(resource), "Resource enabled");
                    }
                    Err(e) => {
                        warn!(
                            resource = tables.catalog.resource_name(resource),
                            error = %e,
                            "Resource enable failed"
                        );
                        report.resource_failures.insert(resource);
                        resource_errors[resource.index()] = Some(e.reason());
                    }
                }
            }
        }

        // Providers first.
        for &id in &tables.order {
            if to_keep.contains(id) {
                tables.bind_provides(state, &plan, id);
                continue;
            }
            if !to_create.contains(id) {
                continue;
            }
            let required = tables.descriptor(id).required_resources;
            if let Some(resource) = required.intersection(report.resource_failures).first() {
                report.record(id, resource_unavailable(resource, &resource_errors));
                continue;
            }
            match tables.construct(state, id) {
                Ok(()) => {
                    report.constructed.insert(id);
                    tables.bind_provides(state, &plan, id);
                }
                Err(e) => {
                    warn!(subsystem = tables.name(id), error = %e, "Subsystem omitted");
                    report.record(id, e);
                }
            }
        }

        // Live subsystems whose provider failed to come up.
        loop {
            let mut swept = false;
            for &id in tables.order.iter().rev() {
                if !state.active.contains(id) {
                    continue;
                }
                let registry = &state.registry;
                let missing = tables
                    .descriptor(id)
                    .dependencies
                    .iter()
                    .find(|cap| registry.provider(*cap).is_none());
                if let Some(capability) = missing {
                    warn!(subsystem = tables.name(id), capability = %capability, "Dependency lost");
                    tables.destroy(state, id);
                    if !report.constructed.remove(id) {
                        report.destroyed.insert(id);
                    }
                    report.record(id, LifecycleError::DependencyUnresolved { capability });
                    swept = true;
                }
            }
            if !swept {
                break;
            }
        }

        let changed = state.registry.changed_since_checkpoint();
        for &id in &tables.order {
            if !to_keep.contains(id) || !state.active.contains(id) {
                continue;
            }
            let stale = tables.descriptor(id).dependencies.intersection(changed);
            if stale.is_empty() {
                continue;
            }
            for cap in stale.iter() {
                if let Some(provider) = state.registry.provider(cap) {
                    if let Some(instance) = tables.instance_mut(state, id) {
                        instance.refresh(cap, provider);
                    }
                }
            }
            report.refreshed.insert(id);
            debug!(subsystem = tables.name(id), capabilities = %stale, "Dependencies refreshed");
        }

        state.mode = Some(mode);
        state.transitions += 1;
        report.active = state.active;
        report.duration = started.elapsed();
        info!(
            from = report.from.map(|m| tables.catalog.mode_name(m)).unwrap_or("-"),
            to = tables.catalog.mode_name(mode),
            active = %report.active,
            constructed = report.constructed.len(),
            destroyed = report.destroyed.len(),
            refreshed = report.refreshed.len(),
            failures = report.failures.len(),
            "Mode transition complete"
        );
        state.last_report = Some(report.clone());
        Ok(report)
    }

    /// Transition to the catalog's fail-safe mode.
    ///
    /// # Errors
    /// Same as [`transition_to`](Self::transition_to).
    pub fn recover(&self) -> Result<TransitionReport, LifecycleError> {
        let mode = self.tables.catalog.fail_safe_mode();
        warn!(mode = self.tables.catalog.mode_name(mode), "Recovering to fail-safe mode");
        self.transition_to(mode)
    }

    /// Live handle to `id`, or `None` if it is not active.
    pub fn get(&self, id: SubsystemId) -> Option<MappedRwLockReadGuard<'_, dyn Subsystem + 'static>> {
        let guard = self.state.read();
        RwLockReadGuard::try_map(guard, |state| self.tables.instance(state, id)).ok()
    }

    /// Typed live handle. `None` if inactive or `T` is not its type.
    pub fn get_as<T: Subsystem>(&self, id: SubsystemId) -> Option<MappedRwLockReadGuard<'_, T>> {
        if self.tables.constructors.get(id.index())?.instance_type() != TypeId::of::<T>() {
            return None;
        }
        let guard = self.state.read();
        RwLockReadGuard::try_map(guard, |state| {
            let ptr = self.tables.instance_ptr(state, id)?;
            // SAFETY: the type id matches and the value is live.
            Some(unsafe { &*ptr.cast::<T>() })
        })
        .ok()
    }

    /// Exclusive live handle. Blocks transitions and readers while held.
    pub fn get_mut(&self, id: SubsystemId) -> Option<MappedRwLockWriteGuard<'_, dyn Subsystem + 'static>> {
        let guard = self.state.write();
        RwLockWriteGuard::try_map(guard, |state| self.tables.instance_mut(state, id)).ok()
    }

    /// Typed exclusive handle.
    pub fn get_mut_as<T: Subsystem>(&self, id: SubsystemId) -> Option<MappedRwLockWriteGuard<'_, T>> {
        if self.tables.constructors.get(id.index())?.instance_type() != TypeId::of::<T>() {
            return None;
        }
        let guard = self.state.write();
        RwLockWriteGuard::try_map(guard, |state| {
            let instance = self.tables.instance_mut(state, id)?;
            // SAFETY: the type id matches.
            Some(unsafe { &mut *(instance as *mut dyn Subsystem).cast::<T>() })
        })
        .ok()
    }

    /// Mode currently entered.
    pub fn current_mode(&self) -> ModeId {
        self.state
            .read()
            .mode
            .unwrap_or_else(|| self.tables.catalog.boot_mode())
    }

    /// Live subsystems.
    pub fn active_subsystems(&self) -> SubsystemSet {
        self.state.read().active
    }

    /// Whether `id` is live.
    pub fn is_active(&self, id: SubsystemId) -> bool {
        self.state.read().active.contains(id)
    }

    /// Resources currently powered.
    pub fn enabled_resources(&self) -> ResourceSet {
        self.state.read().enabled
    }

    /// Used/capacity of a memory class.
    pub fn memory_usage(&self, class: MemoryClass) -> Option<MemoryUsage> {
        self.tables.layout.usage(class)
    }

    /// Report of the most recent transition.
    pub fn last_report(&self) -> Option<TransitionReport> {
        self.state.read().last_report.clone()
    }

    /// Number of completed transitions, boot included.
    pub fn transition_count(&self) -> u64 {
        self.state.read().transitions
    }

    /// Provider currently bound to `capability`.
    pub fn provider_of(&self, capability: CapabilityId) -> Option<SubsystemId> {
        self.state.read().registry.provider(capability)
    }

    /// Planned memory layout.
    pub fn layout(&self) -> &MemoryLayout {
        &self.tables.layout
    }

    /// Region reserved for `id`.
    pub fn region_of(&self, id: SubsystemId) -> Option<&MemoryRegion> {
        self.tables.layout.region_of(id)
    }

    /// Id of the subsystem registered as `name`.
    pub fn subsystem_id(&self, name: &str) -> Option<SubsystemId> {
        self.tables
            .descriptors
            .iter()
            .position(|d| d.name == name)
            .map(SubsystemId::from_index)
    }

    /// Registered descriptors, indexed by id.
    pub fn descriptors(&self) -> &[SubsystemDescriptor] {
        &self.tables.descriptors
    }

    /// Name of `id`; `"?"` for unknown ids.
    pub fn subsystem_name(&self, id: SubsystemId) -> &str {
        self.tables.name(id)
    }

    /// Resource catalog.
    pub fn catalog(&self) -> &ResourceCatalog {
        &self.tables.catalog
    }

    /// Capability names.
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.tables.capabilities
    }

    /// Static construction order (providers first).
    pub fn construction_order(&self) -> &[SubsystemId] {
        &self.tables.order
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        let tables = &self.tables;
        let state = self.state.get_mut();
        for &id in tables.order.iter().rev() {
            if state.active.contains(id) {
                tables.destroy(state, id);
            }
        }
        let power = self.power.get_mut();
        for resource in state.enabled.iter() {
            power.disable(resource);
        }
        state.enabled = ResourceSet::EMPTY;
        info!("Lifecycle manager shut down");
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("mode", &self.current_mode())
            .field("active", &self.active_subsystems())
            .finish_non_exhaustive()
    }
}

fn resource_unavailable(
    resource: ResourceId,
    reasons: &[Option<&'static str>; MAX_RESOURCES],
) -> LifecycleError {
    LifecycleError::ResourceUnavailable {
        resource,
        reason: reasons[resource.index()].unwrap_or("enable failed"),
    }
}
