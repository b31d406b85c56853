use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

use fdo_credential_store::{DeviceCredential, TransportProtocol};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol message error: {0}")]
    Message(String),
    #[error("Server rejected request: {0}")]
    Rejected(String),
}

/// One TO2 endpoint candidate from a TO1 response's redirect list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct To2AddressEntry {
    pub protocol: TransportProtocol,
    pub dns: Option<String>,
    pub ip: Option<IpAddr>,
    /// Zero means "use the protocol's default port".
    pub port: u16,
}

/// The signed payload returned by a successful TO1 call.
///
/// The raw token is carried opaquely into TO2 as continuity proof;
/// only the redirect address list is interpreted here.
#[derive(Debug, Clone, Default)]
pub struct To1Redirect {
    pub token: Vec<u8>,
    pub addresses: Vec<To2AddressEntry>,
}

/// Result of one TO2 attempt that ran to completion.
#[derive(Debug)]
pub enum To2Outcome {
    /// The owner rotated the credential; the caller must persist it.
    NewCredential(Box<DeviceCredential>),
    /// The owner declined to rotate (Credential Reuse Protocol).
    /// A terminal success, not an error.
    CredentialReuse,
}

/// Seam to the external FDO protocol implementation.
///
/// Implementations capture the device credential and protocol
/// configuration at construction; the transfer loop classifies calls
/// only as success, failure, or explicit no-rotation and never
/// inspects message contents.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Runs the TO1 exchange against one rendezvous server.
    async fn to1(&self, url: &str) -> Result<To1Redirect, ProtocolError>;

    /// Runs the TO2 exchange against one owner server. `redirect` is
    /// `None` when the directive bypassed TO1.
    async fn to2(
        &self,
        url: &str,
        redirect: Option<&To1Redirect>,
    ) -> Result<To2Outcome, ProtocolError>;
}
