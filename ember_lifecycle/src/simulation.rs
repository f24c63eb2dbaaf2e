//! Simulation backend.
//!
//! Runs a system described entirely by [`SystemConfig`] without hardware:
//! [`SimulatedPower`] stands in for the power controller (with injectable
//! faults and enable latency) and every configured subsystem is a
//! [`SimulatedSubsystem`]. Probes share state with the running system so
//! tests and the CLI can inject faults and inspect what happened.

use std::sync::Arc;
use std::time::Duration;

use heapless::Vec as HVec;
use parking_lot::Mutex;
use tracing::{debug, info};

use ember_common::config::SystemConfig;
use ember_common::consts::{MAX_DEPENDENCIES, MAX_RESOURCES};
use ember_common::descriptor::CapabilityTable;
use ember_common::error::LifecycleError;
use ember_common::ids::{CapabilityId, ResourceId, ResourceSet, SubsystemId};

use crate::builder::SystemBuilder;
use crate::manager::{LifecycleManager, ManagerSettings};
use crate::power::{PowerControl, PowerError};
use crate::subsystem::{Dependencies, Subsystem, SubsystemError};

/// One simulated power operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    /// Resource powered up.
    Enabled(ResourceId),
    /// Resource powered down.
    Disabled(ResourceId),
    /// Enable failed.
    Failed(ResourceId, PowerError),
}

struct PowerState {
    faults: [Option<PowerError>; MAX_RESOURCES],
    latency: [Duration; MAX_RESOURCES],
    enabled: ResourceSet,
    log: Vec<PowerEvent>,
}

impl Default for PowerState {
    fn default() -> Self {
        Self {
            faults: [None; MAX_RESOURCES],
            latency: [Duration::ZERO; MAX_RESOURCES],
            enabled: ResourceSet::EMPTY,
            log: Vec::new(),
        }
    }
}

/// Power controller without hardware.
///
/// Enabling a resource succeeds unless a fault is injected or its simulated
/// latency exceeds the manager's timeout. Nothing actually sleeps.
#[derive(Clone, Default)]
pub struct SimulatedPower {
    state: Arc<Mutex<PowerState>>,
}

impl SimulatedPower {
    /// Controller with every resource healthy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for fault injection and inspection.
    pub fn probe(&self) -> PowerProbe {
        PowerProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl PowerControl for SimulatedPower {
    fn enable(&mut self, resource: ResourceId, timeout: Duration) -> Result<(), PowerError> {
        let mut state = self.state.lock();
        let index = resource.index();
        let outcome = match state.faults.get(index).copied().flatten() {
            Some(fault) => Err(fault),
            None if state.latency.get(index).is_some_and(|l| *l > timeout) => Err(PowerError::Timeout),
            None => Ok(()),
        };
        match outcome {
            Ok(()) => {
                state.enabled.insert(resource);
                state.log.push(PowerEvent::Enabled(resource));
            }
            Err(e) => state.log.push(PowerEvent::Failed(resource, e)),
        }
        outcome
    }

    fn disable(&mut self, resource: ResourceId) {
        let mut state = self.state.lock();
        state.enabled.remove(resource);
        state.log.push(PowerEvent::Disabled(resource));
    }
}

/// Shared view of a [`SimulatedPower`].
#[derive(Clone)]
pub struct PowerProbe {
    state: Arc<Mutex<PowerState>>,
}

impl PowerProbe {
    /// Make every enable of `resource` fail with `error`.
    pub fn inject_fault(&self, resource: ResourceId, error: PowerError) {
        if let Some(slot) = self.state.lock().faults.get_mut(resource.index()) {
            *slot = Some(error);
        }
    }

    /// Make `resource` take `latency` to come up.
    pub fn set_latency(&self, resource: ResourceId, latency: Duration) {
        if let Some(slot) = self.state.lock().latency.get_mut(resource.index()) {
            *slot = latency;
        }
    }

    /// Remove injected faults and latency for `resource`.
    pub fn heal(&self, resource: ResourceId) {
        let mut state = self.state.lock();
        if let Some(slot) = state.faults.get_mut(resource.index()) {
            *slot = None;
        }
        if let Some(slot) = state.latency.get_mut(resource.index()) {
            *slot = Duration::ZERO;
        }
    }

    /// Resources currently powered.
    pub fn enabled(&self) -> ResourceSet {
        self.state.lock().enabled
    }

    /// Every power operation so far.
    pub fn events(&self) -> Vec<PowerEvent> {
        self.state.lock().log.clone()
    }

    /// Forget recorded events.
    pub fn clear_events(&self) {
        self.state.lock().log.clear();
    }
}

/// One simulated subsystem lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemEvent {
    /// Instance constructed.
    Constructed(SubsystemId),
    /// Dependency provider changed.
    Refreshed(SubsystemId, CapabilityId, SubsystemId),
    /// Instance torn down.
    TornDown(SubsystemId),
}

/// Shared lifecycle event log of simulated subsystems.
#[derive(Debug, Clone, Default)]
pub struct SubsystemProbe {
    log: Arc<Mutex<Vec<SubsystemEvent>>>,
}

impl SubsystemProbe {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SubsystemEvent) {
        self.log.lock().push(event);
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<SubsystemEvent> {
        self.log.lock().clone()
    }

    /// Number of matching events.
    pub fn count(&self, filter: impl Fn(&SubsystemEvent) -> bool) -> usize {
        self.log.lock().iter().filter(|e| filter(e)).count()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

/// Stand-in subsystem that records its lifecycle.
#[derive(Debug)]
pub struct SimulatedSubsystem {
    id: SubsystemId,
    bound: HVec<(CapabilityId, SubsystemId), MAX_DEPENDENCIES>,
    refreshes: u32,
    probe: SubsystemProbe,
}

impl SimulatedSubsystem {
    /// Construct from resolved dependencies.
    pub fn new(id: SubsystemId, deps: &Dependencies, probe: SubsystemProbe) -> Self {
        let mut bound = HVec::new();
        for pair in deps.iter() {
            // Dependencies never exceed the same bound.
            let _ = bound.push(pair);
        }
        probe.push(SubsystemEvent::Constructed(id));
        Self {
            id,
            bound,
            refreshes: 0,
            probe,
        }
    }

    /// Own id.
    pub fn id(&self) -> SubsystemId {
        self.id
    }

    /// Provider currently used for `capability`.
    pub fn provider(&self, capability: CapabilityId) -> Option<SubsystemId> {
        self.bound
            .iter()
            .find(|(cap, _)| *cap == capability)
            .map(|&(_, p)| p)
    }

    /// Refresh notifications received.
    pub fn refreshes(&self) -> u32 {
        self.refreshes
    }
}

impl Subsystem for SimulatedSubsystem {
    fn refresh(&mut self, capability: CapabilityId, provider: SubsystemId) {
        if let Some(entry) = self.bound.iter_mut().find(|(cap, _)| *cap == capability) {
            entry.1 = provider;
        }
        self.refreshes += 1;
        self.probe.push(SubsystemEvent::Refreshed(self.id, capability, provider));
    }

    fn teardown(&mut self) {
        self.probe.push(SubsystemEvent::TornDown(self.id));
    }
}

/// A booted simulated system and its probes.
pub struct SimulatedSystem {
    /// The manager, already in the boot mode.
    pub manager: LifecycleManager,
    /// Power fault injection and log.
    pub power: PowerProbe,
    /// Subsystem lifecycle log.
    pub subsystems: SubsystemProbe,
}

impl std::fmt::Debug for SimulatedSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSystem")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

/// Build and boot the system described by `config`.
///
/// Every subsystem becomes a [`SimulatedSubsystem`]; entries with
/// `fail_construction = true` always fail to construct.
///
/// # Errors
/// Any configuration error.
pub fn build_simulated_system(
    config: &SystemConfig,
    power: SimulatedPower,
) -> Result<SimulatedSystem, LifecycleError> {
    let catalog = config.catalog()?;
    let classes = config.memory_class_table()?;
    let mut capabilities = CapabilityTable::new();
    let descriptors = config.descriptors(&catalog, &classes, &mut capabilities)?;

    let probe = SubsystemProbe::new();
    let mut builder = SystemBuilder::new(catalog, classes, capabilities);
    for (descriptor, entry) in descriptors.into_iter().zip(&config.subsystems) {
        let id = SubsystemId::from_index(builder.subsystem_count());
        let probe = probe.clone();
        let fail = entry.fail_construction;
        builder.register_subsystem(descriptor, move |deps: &Dependencies| {
            if fail {
                return Err(SubsystemError::new("simulated construction failure"));
            }
            Ok(SimulatedSubsystem::new(id, deps, probe.clone()))
        })?;
        debug!(subsystem = %entry.name, id = %id, fail, "Simulated subsystem registered");
    }

    let power_probe = power.probe();
    let manager = builder.build(power, ManagerSettings::from(&config.lifecycle))?;
    info!(
        service = %config.shared.service_name,
        mode = manager.catalog().mode_name(manager.current_mode()),
        "Simulated system booted"
    );
    Ok(SimulatedSystem {
        manager,
        power: power_probe,
        subsystems: probe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_fault_fails_enable() {
        let mut power = SimulatedPower::new();
        let probe = power.probe();
        probe.inject_fault(ResourceId(1), PowerError::Fault("brownout"));

        assert!(power.enable(ResourceId(0), Duration::from_millis(5)).is_ok());
        assert_eq!(
            power.enable(ResourceId(1), Duration::from_millis(5)),
            Err(PowerError::Fault("brownout"))
        );
        assert_eq!(probe.enabled(), ResourceSet::EMPTY.with(ResourceId(0)));

        probe.heal(ResourceId(1));
        assert!(power.enable(ResourceId(1), Duration::from_millis(5)).is_ok());
    }

    #[test]
    fn latency_beyond_timeout_is_a_timeout() {
        let mut power = SimulatedPower::new();
        let probe = power.probe();
        probe.set_latency(ResourceId(2), Duration::from_millis(80));

        assert_eq!(
            power.enable(ResourceId(2), Duration::from_millis(50)),
            Err(PowerError::Timeout)
        );
        assert!(power.enable(ResourceId(2), Duration::from_millis(100)).is_ok());
        assert_eq!(
            probe.events(),
            vec![
                PowerEvent::Failed(ResourceId(2), PowerError::Timeout),
                PowerEvent::Enabled(ResourceId(2)),
            ]
        );
    }

    #[test]
    fn simulated_subsystem_tracks_refresh() {
        let probe = SubsystemProbe::new();
        let mut deps = Dependencies::new();
        deps.push(CapabilityId(0), SubsystemId(4));
        let mut sub = SimulatedSubsystem::new(SubsystemId(1), &deps, probe.clone());

        sub.refresh(CapabilityId(0), SubsystemId(5));
        sub.teardown();

        assert_eq!(sub.provider(CapabilityId(0)), Some(SubsystemId(5)));
        assert_eq!(sub.refreshes(), 1);
        assert_eq!(
            probe.events(),
            vec![
                SubsystemEvent::Constructed(SubsystemId(1)),
                SubsystemEvent::Refreshed(SubsystemId(1), CapabilityId(0), SubsystemId(5)),
                SubsystemEvent::TornDown(SubsystemId(1)),
            ]
        );
    }
}
