use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rvinfo::RendezvousInfo;
use crate::state::DeviceState;

/// The device credential produced by DI and rotated by TO2.
///
/// Key material is carried as opaque DER/secret bytes; interpreting it
/// is the protocol layer's business, not the store's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCredential {
    pub active: bool,
    pub guid: Uuid,
    pub device_info: String,
    pub rendezvous_info: RendezvousInfo,
    #[serde(with = "serde_bytes")]
    pub manufacturer_pubkey_hash: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub private_key_der: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub hmac_secret: Vec<u8>,
}

/// What actually lands in the credential blob: the credential plus the
/// device lifecycle state, written together in one atomic operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCredential {
    pub credential: DeviceCredential,
    pub state: DeviceState,
}

impl std::fmt::Display for PersistedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Device credential:")?;
        writeln!(f, "  Active: {}", self.credential.active)?;
        writeln!(f, "  GUID: {}", self.credential.guid)?;
        writeln!(f, "  Device info: {}", self.credential.device_info)?;
        writeln!(
            f,
            "  Rendezvous directives: {}",
            self.credential.rendezvous_info.directives().len()
        )?;
        for directive in self.credential.rendezvous_info.directives() {
            writeln!(
                f,
                "    {:?} (delay {}s, bypass {})",
                directive.get_urls(),
                directive.delay_secs,
                directive.bypass
            )?;
        }
        write!(f, "  State: {}", self.state)
    }
}
