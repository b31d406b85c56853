pub mod credential;
pub mod file;
pub mod rvinfo;
pub mod state;

use thiserror::Error;

pub use credential::{DeviceCredential, PersistedCredential};
pub use file::FileCredentialStore;
pub use rvinfo::{RendezvousInfo, RvDirectiveInfo, TransportProtocol};
pub use state::DeviceState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Error reading credential blob at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Error writing credential blob at {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("Error parsing credential blob at {path}: {source}")]
    Parse {
        path: String,
        source: serde_cbor::Error,
    },
    #[error("Error serializing credential blob: {0}")]
    Serialize(#[source] serde_cbor::Error),
    #[error("Invalid device state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::DeviceState,
        to: state::DeviceState,
    },
}

/// Persistence seam for the device credential and its state.
///
/// The onboarding flow reads the credential once before the transfer
/// loop starts and writes it back at most once, after the loop has
/// terminated successfully. Atomicity of the write is the store's
/// responsibility.
pub trait CredentialStore {
    /// Returns the persisted credential, or `None` if no credential
    /// has been stored yet (the device still has to run DI).
    fn load(&self) -> Result<Option<PersistedCredential>, StoreError>;
    fn save(&self, credential: &PersistedCredential) -> Result<(), StoreError>;
}
