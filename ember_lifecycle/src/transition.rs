//! Transition results.
//!
//! A transition never aborts because of one subsystem. Each subsystem that
//! could not be made live is listed with its error, and the caller decides
//! whether to proceed degraded, retry, or fall back to the fail-safe mode.

use std::time::Duration;

use heapless::Vec as HVec;
use serde::Serialize;

use ember_common::consts::MAX_SUBSYSTEMS;
use ember_common::error::LifecycleError;
use ember_common::ids::{ModeId, ResourceSet, SubsystemId, SubsystemSet};

/// One subsystem omitted from the active set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemFailure {
    /// Omitted subsystem.
    pub subsystem: SubsystemId,
    /// Why it is not live.
    pub error: LifecycleError,
}

/// Overall result of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionOutcome {
    /// Every targeted subsystem is live.
    Complete,
    /// Some targeted subsystems were omitted.
    Degraded,
}

/// Structured result of `transition_to`.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    /// Mode before the transition; `None` for the boot transition.
    pub from: Option<ModeId>,
    /// Mode now current.
    pub to: ModeId,
    /// Active set after the transition.
    pub active: SubsystemSet,
    /// Subsystems constructed by this transition.
    pub constructed: SubsystemSet,
    /// Previously live subsystems destroyed by this transition.
    pub destroyed: SubsystemSet,
    /// Kept subsystems whose dependencies were refreshed.
    pub refreshed: SubsystemSet,
    /// Subsystems that should be live but are not.
    pub failures: HVec<SubsystemFailure, MAX_SUBSYSTEMS>,
    /// Resources that failed to enable.
    pub resource_failures: ResourceSet,
    /// Wall time spent inside the transition.
    pub duration: Duration,
}

impl TransitionReport {
    pub(crate) fn new(from: Option<ModeId>, to: ModeId) -> Self {
        Self {
            from,
            to,
            active: SubsystemSet::EMPTY,
            constructed: SubsystemSet::EMPTY,
            destroyed: SubsystemSet::EMPTY,
            refreshed: SubsystemSet::EMPTY,
            failures: HVec::new(),
            resource_failures: ResourceSet::EMPTY,
            duration: Duration::ZERO,
        }
    }

    /// Record the first failure of `subsystem`; later ones are ignored.
    pub(crate) fn record(&mut self, subsystem: SubsystemId, error: LifecycleError) {
        if self.failure(subsystem).is_none() {
            // One entry per subsystem, so capacity is never exceeded.
            let _ = self.failures.push(SubsystemFailure { subsystem, error });
        }
    }

    /// Whether every targeted subsystem is live.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Complete or degraded.
    pub fn outcome(&self) -> TransitionOutcome {
        if self.is_complete() {
            TransitionOutcome::Complete
        } else {
            TransitionOutcome::Degraded
        }
    }

    /// Failure recorded for `subsystem`.
    pub fn failure(&self, subsystem: SubsystemId) -> Option<&LifecycleError> {
        self.failures
            .iter()
            .find(|f| f.subsystem == subsystem)
            .map(|f| &f.error)
    }

    /// Subsystems listed as failed.
    pub fn failed(&self) -> SubsystemSet {
        self.failures.iter().map(|f| f.subsystem).collect()
    }

    /// Whether the transition changed nothing.
    pub fn is_noop(&self) -> bool {
        self.constructed.is_empty() && self.destroyed.is_empty() && self.refreshed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_common::ids::CapabilityId;

    #[test]
    fn first_failure_wins() {
        let mut report = TransitionReport::new(None, ModeId(0));
        assert_eq!(report.outcome(), TransitionOutcome::Complete);

        let unresolved = LifecycleError::DependencyUnresolved {
            capability: CapabilityId(1),
        };
        report.record(SubsystemId(3), unresolved.clone());
        report.record(
            SubsystemId(3),
            LifecycleError::ConstructionFailure { reason: "late" },
        );

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failure(SubsystemId(3)), Some(&unresolved));
        assert_eq!(report.failed(), SubsystemSet::EMPTY.with(SubsystemId(3)));
        assert_eq!(report.outcome(), TransitionOutcome::Degraded);
    }

    #[test]
    fn empty_report_is_noop() {
        let report = TransitionReport::new(Some(ModeId(0)), ModeId(0));
        assert!(report.is_noop());
        assert!(report.is_complete());
    }

    #[test]
    fn report_serializes() {
        let mut report = TransitionReport::new(Some(ModeId(0)), ModeId(1));
        report.active.insert(SubsystemId(0));
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"to\":1"));
    }
}
