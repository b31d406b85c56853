//! Ownership-transfer orchestration for an FDO device client.
//!
//! The actual DI/TO1/TO2 wire exchanges are performed by an external
//! protocol implementation reached through the [`ProtocolClient`]
//! trait; this crate owns the retry state machine around it: walking
//! the credential's rendezvous directives, discovering owner URLs via
//! TO1 (or rendezvous bypass), attempting TO2 against each candidate,
//! and applying the jittered retry delays FDO requires until onboarding
//! succeeds or the operator cancels.

pub mod config;
pub mod delay;
pub mod directive;
pub mod discover;
pub mod error;
pub mod protocol;
pub mod resolve;
pub mod state;
pub mod transfer;

pub use config::{CipherSuite, KexSuite, OnboardConfig};
pub use directive::RvDirective;
pub use error::OnboardError;
pub use protocol::{ProtocolClient, ProtocolError, To1Redirect, To2AddressEntry, To2Outcome};
pub use state::{next_action, NextAction};
pub use transfer::transfer_ownership;
