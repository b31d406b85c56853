//! Concrete TO1/TO2 protocol driver speaking CBOR over HTTP.
//!
//! The retry engine only sees the [`ProtocolClient`] trait; this
//! module owns the message encoding, device signatures, and the
//! service info exchange. Ownership voucher chain validation and the
//! encrypted TO2 channel are not implemented here; messages are
//! exchanged in plain CBOR and the owner's SetupDevice payload is
//! accepted on the strength of the TLS connection.

use std::net::IpAddr;

use async_trait::async_trait;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use rand::RngCore;

use fdo_client_util::device_info::DevmodInfo;
use fdo_credential_store::{DeviceCredential, TransportProtocol};
use fdo_http_client::ServiceClient;
use fdo_onboard_core::{
    OnboardConfig, ProtocolClient, ProtocolError, To1Redirect, To2AddressEntry, To2Outcome,
};

use crate::config::FsimConfig;
use crate::serviceinfo;
use crate::wire;

pub struct DeviceProtocolClient {
    credential: DeviceCredential,
    config: OnboardConfig,
    devmod: DevmodInfo,
    fsim: FsimConfig,
}

impl DeviceProtocolClient {
    pub fn new(
        credential: DeviceCredential,
        config: OnboardConfig,
        devmod: DevmodInfo,
        fsim: FsimConfig,
    ) -> Self {
        DeviceProtocolClient {
            credential,
            config,
            devmod,
            fsim,
        }
    }

    fn signing_key(&self) -> Result<PKey<Private>, ProtocolError> {
        PKey::private_key_from_der(&self.credential.private_key_der)
            .map_err(|e| ProtocolError::Message(format!("error loading device key: {}", e)))
    }

    fn new_client(&self, url: &str) -> Result<ServiceClient, ProtocolError> {
        ServiceClient::new(url, self.config.insecure_tls)
            .map_err(|e| ProtocolError::Transport(e.to_string()))
    }

    fn sign(&self, payload: Vec<u8>) -> Result<wire::CoseSign1, ProtocolError> {
        let key = self.signing_key()?;
        wire::CoseSign1::create(payload, &key)
            .map_err(|e| ProtocolError::Message(format!("error signing payload: {}", e)))
    }

    fn sig_info(&self) -> wire::SigInfo {
        wire::SigInfo {
            sg_type: wire::SIG_TYPE_SECP384R1,
            info: serde_bytes::ByteBuf::new(),
        }
    }

    fn guid_bytes(&self) -> serde_bytes::ByteBuf {
        serde_bytes::ByteBuf::from(self.credential.guid.as_bytes().to_vec())
    }
}

fn random_nonce() -> serde_bytes::ByteBuf {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    serde_bytes::ByteBuf::from(nonce.to_vec())
}

fn transport_error(e: fdo_http_client::Error) -> ProtocolError {
    match e {
        fdo_http_client::Error::Error(em) => ProtocolError::Rejected(em.to_string()),
        other => ProtocolError::Transport(other.to_string()),
    }
}

fn message_error<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> ProtocolError + '_ {
    move |e| ProtocolError::Message(format!("{}: {}", what, e))
}

/// Converts a wire redirect address (IP as raw octets) into the typed
/// entry the resolver consumes.
fn redirect_entry(addr: &wire::RvTo2Addr) -> Option<To2AddressEntry> {
    let protocol = match addr.protocol {
        1 => TransportProtocol::Tcp,
        2 => TransportProtocol::Tls,
        3 => TransportProtocol::Http,
        4 => TransportProtocol::CoapTcp,
        5 => TransportProtocol::Https,
        6 => TransportProtocol::CoapUdp,
        other => {
            log::warn!("Unknown transport protocol value in redirect: {}", other);
            return None;
        }
    };
    let ip = match addr.ip.as_deref() {
        None => None,
        Some(octets) if octets.len() == 4 => {
            let mut v4 = [0u8; 4];
            v4.copy_from_slice(octets);
            Some(IpAddr::from(v4))
        }
        Some(octets) if octets.len() == 16 => {
            let mut v6 = [0u8; 16];
            v6.copy_from_slice(octets);
            Some(IpAddr::from(v6))
        }
        Some(octets) => {
            log::warn!("Malformed IP address in redirect ({} bytes)", octets.len());
            return None;
        }
    };
    Some(To2AddressEntry {
        protocol,
        dns: addr.dns.clone(),
        ip,
        port: addr.port,
    })
}

#[async_trait]
impl ProtocolClient for DeviceProtocolClient {
    async fn to1(&self, url: &str) -> Result<To1Redirect, ProtocolError> {
        let mut client = self.new_client(url)?;

        let hello = serde_cbor::to_vec(&wire::HelloRv {
            guid: self.guid_bytes(),
            sig_info: self.sig_info(),
        })
        .map_err(message_error("error encoding HelloRV"))?;
        let ack = client
            .send_request(wire::TO1_HELLO_RV, hello, wire::TO1_HELLO_RV_ACK)
            .await
            .map_err(transport_error)?;
        let ack: wire::HelloRvAck =
            serde_cbor::from_slice(&ack).map_err(message_error("error parsing HelloRVAck"))?;

        // Prove possession of the device key by signing the challenge.
        let proof = self.sign(ack.nonce.into_vec())?;
        let proof =
            serde_cbor::to_vec(&proof).map_err(message_error("error encoding ProveToRV"))?;
        let redirect_bytes = client
            .send_request(wire::TO1_PROVE_TO_RV, proof, wire::TO1_RV_REDIRECT)
            .await
            .map_err(transport_error)?;

        let redirect: wire::CoseSign1 = serde_cbor::from_slice(&redirect_bytes)
            .map_err(message_error("error parsing RVRedirect"))?;
        let to1d: wire::To1dPayload = serde_cbor::from_slice(&redirect.payload)
            .map_err(message_error("error parsing to1d payload"))?;

        let addresses = to1d.addresses.iter().filter_map(redirect_entry).collect();
        Ok(To1Redirect {
            // The raw signed blob travels into TO2 for the owner to
            // cross-check against what it registered at the rendezvous.
            token: redirect_bytes,
            addresses,
        })
    }

    async fn to2(
        &self,
        url: &str,
        redirect: Option<&To1Redirect>,
    ) -> Result<To2Outcome, ProtocolError> {
        let mut client = self.new_client(url)?;

        let nonce_prove_ov = random_nonce();
        let hello = serde_cbor::to_vec(&wire::HelloDevice {
            max_device_message_size: self.config.max_serviceinfo_size,
            guid: self.guid_bytes(),
            nonce: nonce_prove_ov.clone(),
            kex_suite_name: self.config.kex_suite.name().to_string(),
            cipher_suite_name: self.config.cipher_suite.name().to_string(),
            sig_info: self.sig_info(),
        })
        .map_err(message_error("error encoding HelloDevice"))?;
        let prove_ov_hdr = client
            .send_request(wire::TO2_HELLO_DEVICE, hello, wire::TO2_PROVE_OV_HDR)
            .await
            .map_err(transport_error)?;
        let prove_ov_hdr: wire::CoseSign1 = serde_cbor::from_slice(&prove_ov_hdr)
            .map_err(message_error("error parsing ProveOVHdr"))?;
        let ov_hdr: wire::ProveOvHdrPayload = serde_cbor::from_slice(&prove_ov_hdr.payload)
            .map_err(message_error("error parsing ProveOVHdr payload"))?;
        log::trace!(
            "Received voucher header with {} entries",
            ov_hdr.num_entries
        );
        if ov_hdr.nonce != nonce_prove_ov {
            return Err(ProtocolError::Message(
                "owner did not echo the proof-of-voucher nonce".to_string(),
            ));
        }
        if redirect.is_some() {
            log::trace!("TO2 reached through TO1 redirect");
        }

        let nonce_setup_dv = random_nonce();
        let prove_device_payload = serde_cbor::to_vec(&wire::ProveDevicePayload {
            nonce_prove_dv: ov_hdr.nonce_prove_dv.clone(),
            nonce_setup_dv: nonce_setup_dv.clone(),
        })
        .map_err(message_error("error encoding ProveDevice payload"))?;
        let prove_device = self.sign(prove_device_payload)?;
        let prove_device = serde_cbor::to_vec(&prove_device)
            .map_err(message_error("error encoding ProveDevice"))?;
        let setup = client
            .send_request(wire::TO2_PROVE_DEVICE, prove_device, wire::TO2_SETUP_DEVICE)
            .await
            .map_err(transport_error)?;
        let setup: wire::CoseSign1 =
            serde_cbor::from_slice(&setup).map_err(message_error("error parsing SetupDevice"))?;
        let setup: wire::SetupDevicePayload = serde_cbor::from_slice(&setup.payload)
            .map_err(message_error("error parsing SetupDevice payload"))?;
        if setup.nonce != nonce_setup_dv {
            return Err(ProtocolError::Message(
                "owner did not echo the setup nonce".to_string(),
            ));
        }

        // The owner signals credential reuse by sending the device's
        // current identity back unchanged.
        let reuse = setup.guid.as_slice() == self.credential.guid.as_bytes()
            && setup.owner_pubkey_hash.as_slice()
                == self.credential.manufacturer_pubkey_hash.as_slice();
        if reuse && !self.config.allow_credential_reuse {
            return Err(ProtocolError::Rejected(
                "owner requested credential reuse, which is not permitted".to_string(),
            ));
        }

        // On rotation, send the HMAC the owner needs for the
        // replacement voucher header; on reuse there is nothing to
        // replace.
        let replacement_hmac = if reuse {
            None
        } else {
            Some(self.replacement_hmac(&setup)?)
        };
        let ready = serde_cbor::to_vec(&wire::DeviceServiceInfoReady {
            replacement_hmac,
            max_owner_message_size: None,
        })
        .map_err(message_error("error encoding DeviceServiceInfoReady"))?;
        client
            .send_request(
                wire::TO2_DEVICE_SERVICE_INFO_READY,
                ready,
                wire::TO2_OWNER_SERVICE_INFO_READY,
            )
            .await
            .map_err(transport_error)?;

        serviceinfo::exchange(&mut client, &self.devmod, &self.fsim)
            .await
            .map_err(|e| ProtocolError::Message(format!("service info exchange failed: {}", e)))?;

        let done = serde_cbor::to_vec(&wire::Done {
            nonce: ov_hdr.nonce_prove_dv.clone(),
        })
        .map_err(message_error("error encoding Done"))?;
        let done2 = client
            .send_request(wire::TO2_DONE, done, wire::TO2_DONE2)
            .await
            .map_err(transport_error)?;
        let done2: wire::Done =
            serde_cbor::from_slice(&done2).map_err(message_error("error parsing Done2"))?;
        if done2.nonce != nonce_setup_dv {
            return Err(ProtocolError::Message(
                "owner did not echo the setup nonce in Done2".to_string(),
            ));
        }

        if reuse {
            return Ok(To2Outcome::CredentialReuse);
        }

        let guid = uuid::Uuid::from_slice(&setup.guid)
            .map_err(message_error("malformed replacement GUID"))?;
        let mut credential = self.credential.clone();
        credential.guid = guid;
        credential.rendezvous_info = setup.rendezvous_info;
        credential.manufacturer_pubkey_hash = setup.owner_pubkey_hash.into_vec();
        Ok(To2Outcome::NewCredential(Box::new(credential)))
    }
}

impl DeviceProtocolClient {
    /// HMAC over the replacement identity, keyed with the device's
    /// stored secret, so the owner can build the new voucher header.
    fn replacement_hmac(
        &self,
        setup: &wire::SetupDevicePayload,
    ) -> Result<serde_bytes::ByteBuf, ProtocolError> {
        let identity = serde_cbor::to_vec(&(
            &setup.guid,
            &setup.rendezvous_info,
            &self.credential.device_info,
        ))
        .map_err(message_error("error encoding replacement identity"))?;
        let key = PKey::hmac(&self.credential.hmac_secret)
            .map_err(message_error("error loading hmac secret"))?;
        let mut signer = Signer::new(MessageDigest::sha384(), &key)
            .map_err(message_error("error initializing hmac"))?;
        signer
            .update(&identity)
            .map_err(message_error("error computing hmac"))?;
        let hmac = signer
            .sign_to_vec()
            .map_err(message_error("error finalizing hmac"))?;
        Ok(serde_bytes::ByteBuf::from(hmac))
    }
}
