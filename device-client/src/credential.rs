//! Credential blob handling for the commands: status lookup, state
//! updates after onboarding, and the print command.

use anyhow::{bail, Context, Result};

use fdo_credential_store::{
    CredentialStore, DeviceCredential, DeviceState, FileCredentialStore, PersistedCredential,
};

/// Loads the persisted state; a missing or empty blob means the device
/// has not run DI yet.
pub fn load_device_status(
    store: &FileCredentialStore,
) -> Result<(DeviceState, Option<PersistedCredential>)> {
    match store.load().context("load device status failed")? {
        None => {
            log::debug!("DeviceCredential missing or empty. Set state to run DI");
            Ok((DeviceState::PreDi, None))
        }
        Some(persisted) => Ok((persisted.state, Some(persisted))),
    }
}

pub fn print_device_status(status: DeviceState) {
    match status {
        DeviceState::PreDi => log::debug!("Device is ready for DI"),
        DeviceState::PreTo1 => log::debug!("Device is ready for Ownership transfer"),
        DeviceState::Idle => log::debug!("Device Ownership transfer Done"),
        DeviceState::Resale => log::debug!("Device is ready for Ownership transfer"),
        DeviceState::Error => log::debug!("Error in getting device status"),
    }
}

/// Persists a credential rotated by TO2 together with the new state.
/// Refuses state changes the device lifecycle does not allow;
/// rewriting the blob in the same state (resale) is always fine.
pub fn update_credential(
    store: &FileCredentialStore,
    credential: DeviceCredential,
    state: DeviceState,
) -> Result<()> {
    if let Some(existing) = store.load()? {
        if existing.state != state {
            existing.state.verify_transition(state)?;
        }
    }
    store
        .save(&PersistedCredential { credential, state })
        .with_context(|| format!("error saving credential to {:?}", store.path()))
}

/// The print subcommand: dump the blob contents and exit.
pub fn print_credential(store: &FileCredentialStore) -> Result<()> {
    match store.load()? {
        Some(persisted) => {
            println!("{}", persisted);
            println!(
                "  Manufacturer public key hash: {}",
                hex::encode(&persisted.credential.manufacturer_pubkey_hash)
            );
            Ok(())
        }
        None => bail!("no device credential found at {:?}", store.path()),
    }
}
