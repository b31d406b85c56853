//! The onboard command: dispatch on the persisted device state, run
//! the ownership transfer engine, and persist the outcome.

use anyhow::{anyhow, bail, Result};
use tokio_util::sync::CancellationToken;

use fdo_client_util::device_info::DevmodInfo;
use fdo_credential_store::{DeviceState, FileCredentialStore};
use fdo_onboard_core::{next_action, transfer_ownership, NextAction};

use crate::config::OnboardCommandConfig;
use crate::credential::{load_device_status, print_device_status, update_credential};
use crate::protocol::DeviceProtocolClient;

pub async fn run(
    cancel: &CancellationToken,
    store: &FileCredentialStore,
    config: OnboardCommandConfig,
) -> Result<()> {
    let (status, persisted) = load_device_status(store)?;
    print_device_status(status);

    match next_action(status, config.onboard.resale) {
        NextAction::RunOnboarding => {}
        NextAction::AlreadyOnboarded => {
            log::info!("FDO in Idle State. Device Onboarding already completed");
            return Ok(());
        }
        NextAction::RunDeviceInit => {
            bail!("device has not been properly initialized: run device-init first")
        }
        NextAction::InvalidState => bail!("device state is invalid: {}", status),
    }

    let credential = persisted
        .ok_or_else(|| anyhow!("device state says onboard but no credential is stored"))?
        .credential;

    let devmod = DevmodInfo::gather();
    let client = DeviceProtocolClient::new(
        credential.clone(),
        config.onboard.clone(),
        devmod,
        config.fsim,
    );

    match transfer_ownership(cancel, &client, &credential.rendezvous_info, &config.onboard).await {
        Ok(Some(new_credential)) => {
            log::info!("FIDO Device Onboard Complete");
            update_credential(store, new_credential, DeviceState::Idle)
        }
        Ok(None) => {
            // Owner kept the current credential; the blob stays as-is.
            log::info!("Credential not updated (Credential Reuse Protocol)");
            Ok(())
        }
        Err(e) => {
            if e.is_canceled() {
                log::info!("Onboarding canceled by user");
            }
            Err(e.into())
        }
    }
}
