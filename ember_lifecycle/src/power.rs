//! Power/resource control collaborator.
//!
//! The manager enables and disables hardware resources while entering a
//! mode. Enabling may block, but never longer than the timeout it is given;
//! a failure only removes the subsystems that need the resource.

use std::time::Duration;

use thiserror::Error;

use ember_common::ids::ResourceId;

/// Resource enable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PowerError {
    /// Resource did not come up within the timeout.
    #[error("enable timed out")]
    Timeout,

    /// Hardware reported a fault.
    #[error("fault: {0}")]
    Fault(&'static str),
}

impl PowerError {
    /// Static reason for transition reports.
    pub const fn reason(&self) -> &'static str {
        match self {
            PowerError::Timeout => "enable timed out",
            PowerError::Fault(reason) => *reason,
        }
    }
}

/// Hardware power management backend.
pub trait PowerControl: Send {
    /// Power up `resource`, waiting at most `timeout`.
    ///
    /// # Errors
    /// [`PowerError::Timeout`] or a hardware fault.
    fn enable(&mut self, resource: ResourceId, timeout: Duration) -> Result<(), PowerError>;

    /// Power down `resource`. Never fails.
    fn disable(&mut self, resource: ResourceId);
}

/// Backend for hardware whose resources are always powered.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOn;

impl PowerControl for AlwaysOn {
    fn enable(&mut self, _resource: ResourceId, _timeout: Duration) -> Result<(), PowerError> {
        Ok(())
    }

    fn disable(&mut self, _resource: ResourceId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_static() {
        assert_eq!(PowerError::Timeout.reason(), "enable timed out");
        assert_eq!(PowerError::Fault("rail short").reason(), "rail short");
        assert_eq!(PowerError::Fault("rail short").to_string(), "fault: rail short");
    }

    #[test]
    fn always_on_never_fails() {
        let mut power = AlwaysOn;
        assert!(power.enable(ResourceId(0), Duration::ZERO).is_ok());
        power.disable(ResourceId(0));
    }
}
