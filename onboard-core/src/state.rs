use fdo_credential_store::DeviceState;

/// What the client should do given the persisted device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// No credential yet: device initialization must run first.
    RunDeviceInit,
    /// Credential present and onboarding pending (or resale requested).
    RunOnboarding,
    /// Already onboarded; nothing to do without the resale flag.
    AlreadyOnboarded,
    /// Resale or Error state: the device cannot onboard as-is.
    InvalidState,
}

/// Maps the persisted state to the action the onboard command takes.
/// `resale` re-runs onboarding from the Idle state; it has no effect
/// on any other state.
pub fn next_action(state: DeviceState, resale: bool) -> NextAction {
    match state {
        DeviceState::PreDi => NextAction::RunDeviceInit,
        DeviceState::PreTo1 => NextAction::RunOnboarding,
        DeviceState::Idle if resale => NextAction::RunOnboarding,
        DeviceState::Idle => NextAction::AlreadyOnboarded,
        DeviceState::Resale | DeviceState::Error => NextAction::InvalidState,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_di_requires_device_init() {
        assert_eq!(
            next_action(DeviceState::PreDi, false),
            NextAction::RunDeviceInit
        );
        // Resale flag does not change a not-yet-initialized device.
        assert_eq!(
            next_action(DeviceState::PreDi, true),
            NextAction::RunDeviceInit
        );
    }

    #[test]
    fn test_pre_to1_onboards() {
        assert_eq!(
            next_action(DeviceState::PreTo1, false),
            NextAction::RunOnboarding
        );
    }

    #[test]
    fn test_idle_is_terminal_without_resale() {
        assert_eq!(
            next_action(DeviceState::Idle, false),
            NextAction::AlreadyOnboarded
        );
        assert_eq!(
            next_action(DeviceState::Idle, true),
            NextAction::RunOnboarding
        );
    }

    #[test]
    fn test_resale_and_error_are_invalid() {
        assert_eq!(
            next_action(DeviceState::Resale, false),
            NextAction::InvalidState
        );
        assert_eq!(
            next_action(DeviceState::Error, true),
            NextAction::InvalidState
        );
    }
}
