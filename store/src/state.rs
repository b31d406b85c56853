use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::StoreError;

/// Lifecycle state persisted alongside the device credential.
///
/// Wire values match the Go client's FdoDeviceState enum so blobs are
/// interchangeable between implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DeviceState {
    PreDi = 1,
    PreTo1 = 2,
    Idle = 3,
    Resale = 4,
    Error = 5,
}

impl DeviceState {
    /// Checks the state transition invariant: DI moves `PreDi` to
    /// `PreTo1`, a successful TO2 moves `PreTo1` to `Idle`, and a
    /// resale request moves `Idle` back to `PreTo1`.
    pub fn verify_transition(self, to: DeviceState) -> Result<(), StoreError> {
        let allowed = matches!(
            (self, to),
            (DeviceState::PreDi, DeviceState::PreTo1)
                | (DeviceState::PreTo1, DeviceState::Idle)
                | (DeviceState::Idle, DeviceState::PreTo1)
        );
        if allowed {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DeviceState::PreDi => "ready for DI",
            DeviceState::PreTo1 => "ready for ownership transfer",
            DeviceState::Idle => "ownership transfer done",
            DeviceState::Resale => "ready for ownership transfer (resale)",
            DeviceState::Error => "error",
        };
        write!(f, "{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(DeviceState::PreDi
            .verify_transition(DeviceState::PreTo1)
            .is_ok());
        assert!(DeviceState::PreTo1
            .verify_transition(DeviceState::Idle)
            .is_ok());
        assert!(DeviceState::Idle
            .verify_transition(DeviceState::PreTo1)
            .is_ok());
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(DeviceState::PreDi
            .verify_transition(DeviceState::Idle)
            .is_err());
        assert!(DeviceState::Idle
            .verify_transition(DeviceState::Idle)
            .is_err());
        assert!(DeviceState::Error
            .verify_transition(DeviceState::PreTo1)
            .is_err());
        assert!(DeviceState::PreTo1
            .verify_transition(DeviceState::PreDi)
            .is_err());
    }
}
