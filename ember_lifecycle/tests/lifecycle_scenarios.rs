//! End-to-end transitions over the sample sensor-node system.
//!
//! The sample (`config/ember.toml`) boots into `idle` with
//! `{core, clock_lp, logger}` live; `work` runs
//! `{core, fast_io, bulk_proc, clock_hs, logger}`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ember_common::config::{ConfigLoader, SystemConfig};
use ember_common::error::LifecycleError;
use ember_common::ids::{MemoryClass, ModeId, ResourceId, SubsystemId, SubsystemSet};
use ember_lifecycle::power::PowerError;
use ember_lifecycle::simulation::{
    PowerEvent, SimulatedPower, SimulatedSubsystem, SimulatedSystem, SubsystemEvent,
    build_simulated_system,
};
use ember_lifecycle::{LifecycleManager, Subsystem, TransitionOutcome};

const SAMPLE: &str = include_str!("../../config/ember.toml");

fn sample_config() -> SystemConfig {
    SystemConfig::from_toml(SAMPLE).expect("sample config parses")
}

fn boot(config: &SystemConfig) -> SimulatedSystem {
    build_simulated_system(config, SimulatedPower::new()).expect("system boots")
}

fn sample() -> SimulatedSystem {
    boot(&sample_config())
}

fn id(manager: &LifecycleManager, name: &str) -> SubsystemId {
    manager.subsystem_id(name).expect("registered subsystem")
}

fn set(manager: &LifecycleManager, names: &[&str]) -> SubsystemSet {
    names.iter().map(|n| id(manager, n)).collect()
}

fn mode(manager: &LifecycleManager, name: &str) -> ModeId {
    manager.catalog().mode_id(name).expect("registered mode")
}

fn resource(manager: &LifecycleManager, name: &str) -> ResourceId {
    manager.catalog().resource_id(name).expect("registered resource")
}

/// Every union region holds at most one live subsystem.
fn assert_single_occupancy(manager: &LifecycleManager) {
    let active = manager.active_subsystems();
    for region in manager.layout().regions() {
        let live = region.occupants.intersection(active).len();
        assert!(live <= 1, "region {:?} has {live} live occupants", region.id);
    }
}

/// Every exclusive resource is held by at most one live subsystem.
fn assert_exclusive_held_once(manager: &LifecycleManager) {
    let active = manager.active_subsystems();
    for resource in manager.catalog().exclusive_resources().iter() {
        let holders = active
            .iter()
            .filter(|s| manager.descriptors()[s.index()].required_resources.contains(resource))
            .count();
        assert!(holders <= 1, "resource {resource} has {holders} live holders");
    }
}

#[test]
fn boots_into_idle() {
    let system = sample();
    let m = &system.manager;

    assert_eq!(m.current_mode(), mode(m, "idle"));
    assert_eq!(m.active_subsystems(), set(m, &["core", "clock_lp", "logger"]));
    assert_eq!(m.enabled_resources().len(), 1);
    assert!(m.enabled_resources().contains(resource(m, "lp_osc")));

    let boot = m.last_report().expect("boot report");
    assert_eq!(boot.from, None);
    assert!(boot.is_complete());
    assert_eq!(m.transition_count(), 1);
}

#[test]
fn work_runs_one_bulk_subsystem() {
    let system = sample();
    let m = &system.manager;

    let report = m.transition_to(mode(m, "work")).expect("valid mode");

    assert_eq!(report.outcome(), TransitionOutcome::Complete);
    assert_eq!(
        m.active_subsystems(),
        set(m, &["core", "fast_io", "bulk_proc", "clock_hs", "logger"])
    );
    assert!(!m.is_active(id(m, "bulk_video")));
    assert_eq!(report.constructed, set(m, &["fast_io", "bulk_proc", "clock_hs"]));
    assert_eq!(report.destroyed, set(m, &["clock_lp"]));
    assert_single_occupancy(m);
    assert_exclusive_held_once(m);
}

#[test]
fn sample_memory_usage() {
    let system = sample();
    let m = &system.manager;

    let sram = m.memory_usage(MemoryClass(0)).expect("sram planned");
    assert_eq!(sram.used, 25 * 1024);
    assert_eq!(sram.capacity, 32 * 1024);

    let dtcm = m.memory_usage(MemoryClass(1)).expect("dtcm planned");
    assert_eq!(dtcm.used, 1024 + 512);
    assert!(m.memory_usage(MemoryClass(7)).is_none());

    let bulk = m.region_of(id(m, "bulk_proc")).expect("placed");
    assert!(bulk.is_union());
    assert_eq!(bulk.size, 20480);
    assert_eq!(m.region_of(id(m, "bulk_video")).map(|r| r.id), Some(bulk.id));
}

#[test]
fn failed_resource_omits_only_its_users() {
    let system = sample();
    let m = &system.manager;
    let bulk_mem = resource(m, "bulk_mem");
    system
        .power
        .inject_fault(bulk_mem, PowerError::Fault("bank offline"));

    let report = m.transition_to(mode(m, "work")).expect("valid mode");

    assert_eq!(report.outcome(), TransitionOutcome::Degraded);
    assert_eq!(
        report.failure(id(m, "bulk_proc")),
        Some(&LifecycleError::ResourceUnavailable {
            resource: bulk_mem,
            reason: "bank offline",
        })
    );
    assert_eq!(report.failed(), set(m, &["bulk_proc"]));
    assert!(report.resource_failures.contains(bulk_mem));
    assert_eq!(
        m.active_subsystems(),
        set(m, &["core", "fast_io", "clock_hs", "logger"])
    );
    assert!(!m.enabled_resources().contains(bulk_mem));
    assert_eq!(m.current_mode(), mode(m, "work"));
}

#[test]
fn re_requesting_mode_retries_omitted_subsystems() {
    let system = sample();
    let m = &system.manager;
    let work = mode(m, "work");
    let bulk_mem = resource(m, "bulk_mem");
    system.power.inject_fault(bulk_mem, PowerError::Timeout);
    m.transition_to(work).expect("valid mode");

    system.power.heal(bulk_mem);
    let retry = m.transition_to(work).expect("valid mode");

    assert!(retry.is_complete());
    assert_eq!(retry.constructed, set(m, &["bulk_proc"]));
    assert!(retry.destroyed.is_empty());
    assert!(m.enabled_resources().contains(bulk_mem));
}

#[test]
fn slow_resource_times_out() {
    let system = sample();
    let m = &system.manager;
    let clock_fast = resource(m, "clock_fast");
    system
        .power
        .set_latency(clock_fast, Duration::from_millis(80));

    let report = m.transition_to(mode(m, "work")).expect("valid mode");

    assert_eq!(
        report.failure(id(m, "clock_hs")),
        Some(&LifecycleError::ResourceUnavailable {
            resource: clock_fast,
            reason: "enable timed out",
        })
    );
    assert!(report.failure(id(m, "fast_io")).is_some());
    assert!(system.power.events().contains(&PowerEvent::Failed(clock_fast, PowerError::Timeout)));
}

#[test]
fn lost_provider_sweeps_kept_dependents() {
    let system = sample();
    let m = &system.manager;
    let logger = id(m, "logger");
    // clock_hs cannot come up, and clock_lp does not survive into work.
    system
        .power
        .inject_fault(resource(m, "clock_fast"), PowerError::Fault("pll unlock"));

    let report = m.transition_to(mode(m, "work")).expect("valid mode");

    let timebase = m.capabilities().id("timebase").expect("interned");
    assert_eq!(
        report.failure(logger),
        Some(&LifecycleError::DependencyUnresolved { capability: timebase })
    );
    assert!(report.destroyed.contains(logger));
    assert!(!m.is_active(logger));
    assert_eq!(m.provider_of(timebase), None);
    assert_eq!(
        system
            .subsystems
            .count(|e| *e == SubsystemEvent::TornDown(logger)),
        1
    );
}

#[test]
fn same_mode_twice_is_noop() {
    let system = sample();
    let m = &system.manager;
    let work = mode(m, "work");
    m.transition_to(work).expect("valid mode");
    system.power.clear_events();
    system.subsystems.clear();

    let again = m.transition_to(work).expect("valid mode");

    assert!(again.is_noop());
    assert!(again.is_complete());
    assert_eq!(again.from, Some(work));
    assert!(system.power.events().is_empty());
    assert!(system.subsystems.events().is_empty());
}

#[test]
fn round_trip_restores_idle_set() {
    let system = sample();
    let m = &system.manager;
    let idle_set = m.active_subsystems();

    m.transition_to(mode(m, "work")).expect("valid mode");
    let back = m.transition_to(mode(m, "idle")).expect("valid mode");

    assert_eq!(m.active_subsystems(), idle_set);
    assert_eq!(back.destroyed, set(m, &["fast_io", "bulk_proc", "clock_hs"]));
    assert_eq!(back.constructed, set(m, &["clock_lp"]));
    assert_eq!(m.enabled_resources(), [resource(m, "lp_osc")].into_iter().collect());
    assert_eq!(m.transition_count(), 3);
    assert_single_occupancy(m);
}

#[test]
fn unknown_mode_changes_nothing() {
    let system = sample();
    let m = &system.manager;
    let before = m.active_subsystems();

    let err = m.transition_to(ModeId(9)).unwrap_err();

    assert_eq!(err, LifecycleError::InvalidModeTransition { mode: ModeId(9) });
    assert_eq!(m.active_subsystems(), before);
    assert_eq!(m.current_mode(), mode(m, "idle"));
    assert_eq!(m.transition_count(), 1);
}

#[test]
fn kept_dependent_is_refreshed_with_new_provider() {
    let system = sample();
    let m = &system.manager;
    let (logger, clock_hs, clock_lp) = (id(m, "logger"), id(m, "clock_hs"), id(m, "clock_lp"));
    let timebase = m.capabilities().id("timebase").expect("interned");
    assert_eq!(m.provider_of(timebase), Some(clock_lp));

    let report = m.transition_to(mode(m, "work")).expect("valid mode");

    assert_eq!(report.refreshed, [logger].into_iter().collect());
    assert_eq!(m.provider_of(timebase), Some(clock_hs));
    let events = system.subsystems.events();
    assert!(events.contains(&SubsystemEvent::Refreshed(logger, timebase, clock_hs)));

    let handle = m.get_as::<SimulatedSubsystem>(logger).expect("logger live");
    assert_eq!(handle.provider(timebase), Some(clock_hs));
    assert_eq!(handle.refreshes(), 1);
}

#[test]
fn new_subsystems_see_current_providers() {
    let system = sample();
    let m = &system.manager;
    m.transition_to(mode(m, "work")).expect("valid mode");

    let timebase = m.capabilities().id("timebase").expect("interned");
    let core_services = m.capabilities().id("core_services").expect("interned");
    let fast_io = m.get_as::<SimulatedSubsystem>(id(m, "fast_io")).expect("live");
    assert_eq!(fast_io.provider(timebase), Some(id(m, "clock_hs")));
    assert_eq!(fast_io.provider(core_services), Some(id(m, "core")));
}

#[test]
fn providers_are_built_before_dependents() {
    let system = sample();
    let m = &system.manager;
    system.subsystems.clear();

    m.transition_to(mode(m, "work")).expect("valid mode");

    let constructed: Vec<SubsystemId> = system
        .subsystems
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SubsystemEvent::Constructed(id) => Some(id),
            _ => None,
        })
        .collect();
    let pos = |name: &str| constructed.iter().position(|s| *s == id(m, name));
    assert!(pos("clock_hs") < pos("fast_io"));
}

#[test]
fn dependency_without_provider_in_mode_is_unresolved() {
    let config = SystemConfig::from_toml(
        r#"
        [shared]
        service_name = "blinky"

        [lifecycle]
        boot_mode = "lit"

        [[memory_class]]
        name = "ram"
        capacity = 4096

        [[resource]]
        name = "osc"

        [[mode]]
        name = "lit"
        resources = ["osc"]

        [[mode]]
        name = "dark"

        [[subsystem]]
        name = "clock"
        memory_class = "ram"
        size = 128
        requires = ["osc"]
        provides = ["tick"]

        [[subsystem]]
        name = "blinker"
        memory_class = "ram"
        size = 128
        depends_on = ["tick"]
        "#,
    )
    .expect("parses");
    let system = boot(&config);
    let m = &system.manager;
    let blinker = id(m, "blinker");
    assert!(m.is_active(blinker));

    let report = m.transition_to(mode(m, "dark")).expect("valid mode");

    let tick = m.capabilities().id("tick").expect("interned");
    assert_eq!(
        report.failure(blinker),
        Some(&LifecycleError::DependencyUnresolved { capability: tick })
    );
    assert!(m.active_subsystems().is_empty());
    assert_eq!(report.destroyed, set(m, &["clock", "blinker"]));
}

#[test]
fn unresolved_claimant_hands_claim_to_next() {
    let config = SystemConfig::from_toml(
        r#"
        [shared]
        service_name = "tracker"

        [lifecycle]
        boot_mode = "idle"

        [[memory_class]]
        name = "ram"
        capacity = 4096

        [[resource]]
        name = "bulk"
        exclusive = true

        [[resource]]
        name = "gps_pwr"

        [[mode]]
        name = "idle"

        [[mode]]
        name = "work"
        resources = ["bulk"]

        [[mode]]
        name = "nav"
        resources = ["gps_pwr", "bulk"]

        [[subsystem]]
        name = "mapper"
        memory_class = "ram"
        size = 512
        requires = ["bulk"]
        depends_on = ["fix"]

        [[subsystem]]
        name = "recorder"
        memory_class = "ram"
        size = 256
        requires = ["bulk"]

        [[subsystem]]
        name = "gps"
        memory_class = "ram"
        size = 128
        requires = ["gps_pwr"]
        provides = ["fix"]
        "#,
    )
    .expect("parses");
    let system = boot(&config);
    let m = &system.manager;
    let mapper = id(m, "mapper");
    let recorder = id(m, "recorder");
    assert_eq!(
        m.region_of(mapper).map(|r| r.id),
        m.region_of(recorder).map(|r| r.id)
    );

    let report = m.transition_to(mode(m, "work")).expect("valid mode");

    let fix = m.capabilities().id("fix").expect("interned");
    assert_eq!(
        report.failure(mapper),
        Some(&LifecycleError::DependencyUnresolved { capability: fix })
    );
    assert_eq!(report.failed(), set(m, &["mapper"]));
    assert_eq!(m.active_subsystems(), set(m, &["recorder"]));
    assert_exclusive_held_once(m);

    // With a provider in the mode, the earlier claimant wins again.
    let nav = m.transition_to(mode(m, "nav")).expect("valid mode");
    assert!(nav.is_complete());
    assert_eq!(m.active_subsystems(), set(m, &["mapper", "gps"]));
    assert_eq!(nav.destroyed, set(m, &["recorder"]));
    assert_single_occupancy(m);
    assert_exclusive_held_once(m);
}

#[test]
fn construction_failure_cascades_to_dependents() {
    let mut config = sample_config();
    let clock_hs = config
        .subsystems
        .iter_mut()
        .find(|s| s.name == "clock_hs")
        .expect("sample has clock_hs");
    clock_hs.fail_construction = true;
    let system = boot(&config);
    let m = &system.manager;

    let report = m.transition_to(mode(m, "work")).expect("valid mode");

    assert_eq!(
        report.failure(id(m, "clock_hs")),
        Some(&LifecycleError::ConstructionFailure {
            reason: "simulated construction failure",
        })
    );
    assert!(matches!(
        report.failure(id(m, "fast_io")),
        Some(LifecycleError::DependencyUnresolved { .. })
    ));
    assert!(m.is_active(id(m, "core")));
    assert!(m.is_active(id(m, "bulk_proc")));
    assert!(m.get(id(m, "clock_hs")).is_none());
}

#[test]
fn get_tracks_active_set() {
    let system = sample();
    let m = &system.manager;
    let fast_io = id(m, "fast_io");
    assert!(m.get(fast_io).is_none());

    m.transition_to(mode(m, "work")).expect("valid mode");

    let handle = m.get_as::<SimulatedSubsystem>(fast_io).expect("live");
    assert_eq!(handle.id(), fast_io);
    drop(handle);
    assert!(m.get(fast_io).is_some());
    assert!(m.get(SubsystemId(60)).is_none());
}

#[test]
fn get_as_rejects_wrong_type() {
    struct Imposter;
    impl Subsystem for Imposter {}

    let system = sample();
    let m = &system.manager;

    assert!(m.get_as::<Imposter>(id(m, "core")).is_none());
    assert!(m.get_as::<SimulatedSubsystem>(id(m, "core")).is_some());
}

#[test]
fn get_mut_allows_in_place_updates() {
    let system = sample();
    let m = &system.manager;
    let logger = id(m, "logger");
    let timebase = m.capabilities().id("timebase").expect("interned");

    m.get_mut_as::<SimulatedSubsystem>(logger)
        .expect("live")
        .refresh(timebase, id(m, "clock_lp"));

    assert_eq!(m.get_as::<SimulatedSubsystem>(logger).expect("live").refreshes(), 1);
}

#[test]
fn recover_enters_fail_safe_mode() {
    let system = sample();
    let m = &system.manager;
    m.transition_to(mode(m, "work")).expect("valid mode");

    let report = m.recover().expect("fail-safe mode is registered");

    assert_eq!(report.to, mode(m, "idle"));
    assert_eq!(m.current_mode(), mode(m, "idle"));
    assert_eq!(m.active_subsystems(), set(m, &["core", "clock_lp", "logger"]));
}

#[test]
fn drop_tears_down_and_powers_off() {
    let SimulatedSystem {
        manager,
        power,
        subsystems,
    } = sample();
    manager.transition_to(mode(&manager, "work")).expect("valid mode");
    let live = manager.active_subsystems();
    subsystems.clear();

    drop(manager);

    let torn: SubsystemSet = subsystems
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SubsystemEvent::TornDown(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(torn, live);
    assert!(power.enabled().is_empty());
}

#[test]
fn readers_never_see_partial_state() {
    let SimulatedSystem { manager, .. } = sample();
    let manager = Arc::new(manager);
    let (idle, work) = (mode(&manager, "idle"), mode(&manager, "work"));
    let logger = id(&manager, "logger");
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    if let Some(handle) = manager.get_as::<SimulatedSubsystem>(logger) {
                        assert_eq!(handle.id(), logger);
                        seen += 1;
                    }
                    assert_single_occupancy(&manager);
                }
                seen
            })
        })
        .collect();

    for round in 0..50 {
        let target = if round % 2 == 0 { work } else { idle };
        let report = manager.transition_to(target).expect("valid mode");
        assert!(report.is_complete());
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().expect("reader thread panicked");
    }
    assert_eq!(manager.transition_count(), 51);
}
