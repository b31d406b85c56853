//! CBOR wire structures for the DI, TO1 and TO2 messages, plus the
//! COSE_Sign1 framing used for device proofs. All protocol bodies are
//! CBOR arrays, hence the tuple serialization.

use std::collections::BTreeMap;

use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKeyRef, Private};
use openssl::sign::Signer;
use serde_bytes::ByteBuf;
use serde_tuple::{Deserialize_tuple, Serialize_tuple};
use thiserror::Error;

use fdo_credential_store::RendezvousInfo;

// Message type numbers (FDO 1.1 section 5).
pub const DI_APP_START: u8 = 10;
pub const DI_SET_CREDENTIALS: u8 = 11;
pub const DI_SET_HMAC: u8 = 12;
pub const DI_DONE: u8 = 13;

pub const TO1_HELLO_RV: u8 = 30;
pub const TO1_HELLO_RV_ACK: u8 = 31;
pub const TO1_PROVE_TO_RV: u8 = 32;
pub const TO1_RV_REDIRECT: u8 = 33;

pub const TO2_HELLO_DEVICE: u8 = 60;
pub const TO2_PROVE_OV_HDR: u8 = 61;
pub const TO2_PROVE_DEVICE: u8 = 64;
pub const TO2_SETUP_DEVICE: u8 = 65;
pub const TO2_DEVICE_SERVICE_INFO_READY: u8 = 66;
pub const TO2_OWNER_SERVICE_INFO_READY: u8 = 67;
pub const TO2_DEVICE_SERVICE_INFO: u8 = 68;
pub const TO2_OWNER_SERVICE_INFO: u8 = 69;
pub const TO2_DONE: u8 = 70;
pub const TO2_DONE2: u8 = 71;

/// COSE signature type for ECDSA over P-384 (eASigInfo/eBSigInfo).
pub const SIG_TYPE_SECP384R1: i16 = -35;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("CBOR encoding error: {0}")]
    Encode(#[from] serde_cbor::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
    #[error("unsupported key type for signing")]
    UnsupportedKey,
}

#[derive(Debug, Clone, Serialize_tuple, Deserialize_tuple)]
pub struct SigInfo {
    pub sg_type: i16,
    pub info: ByteBuf,
}

/// COSE_Sign1 envelope. The signature covers the standard
/// Sig_structure over the protected header and payload.
#[derive(Debug, Clone, Serialize_tuple, Deserialize_tuple)]
pub struct CoseSign1 {
    pub protected: ByteBuf,
    pub unprotected: serde_cbor::Value,
    pub payload: ByteBuf,
    pub signature: ByteBuf,
}

impl CoseSign1 {
    pub fn create(payload: Vec<u8>, key: &PKeyRef<Private>) -> Result<Self, WireError> {
        let (alg, digest) = signature_algorithm(key)?;
        let mut protected_map = BTreeMap::new();
        protected_map.insert(1i64, alg);
        let protected = serde_cbor::to_vec(&protected_map)?;

        let sig_structure = serde_cbor::to_vec(&(
            "Signature1",
            ByteBuf::from(protected.clone()),
            ByteBuf::new(),
            ByteBuf::from(payload.clone()),
        ))?;
        let mut signer = Signer::new(digest, key)?;
        signer.update(&sig_structure)?;
        let signature = signer.sign_to_vec()?;

        Ok(CoseSign1 {
            protected: ByteBuf::from(protected),
            unprotected: serde_cbor::Value::Map(Default::default()),
            payload: ByteBuf::from(payload),
            signature: ByteBuf::from(signature),
        })
    }
}

fn signature_algorithm(key: &PKeyRef<Private>) -> Result<(i64, MessageDigest), WireError> {
    if key.id() == Id::EC {
        if key.bits() == 256 {
            Ok((-7, MessageDigest::sha256()))
        } else {
            Ok((-35, MessageDigest::sha384()))
        }
    } else if key.id() == Id::RSA {
        if key.bits() == 2048 {
            Ok((-257, MessageDigest::sha256()))
        } else {
            Ok((-258, MessageDigest::sha384()))
        }
    } else {
        Err(WireError::UnsupportedKey)
    }
}

// TO1

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct HelloRv {
    pub guid: ByteBuf,
    pub sig_info: SigInfo,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct HelloRvAck {
    pub nonce: ByteBuf,
    pub sig_info: SigInfo,
}

/// One TO2 address in the signed to1d blob: IP as raw octets (4 or
/// 16), optional DNS name, port, transport protocol value.
#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct RvTo2Addr {
    pub ip: Option<ByteBuf>,
    pub dns: Option<String>,
    pub port: u16,
    pub protocol: u8,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct To1dPayload {
    pub addresses: Vec<RvTo2Addr>,
    pub to0d_hash: serde_cbor::Value,
}

// TO2

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct HelloDevice {
    pub max_device_message_size: u16,
    pub guid: ByteBuf,
    pub nonce: ByteBuf,
    pub kex_suite_name: String,
    pub cipher_suite_name: String,
    pub sig_info: SigInfo,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct ProveOvHdrPayload {
    pub ov_header: serde_cbor::Value,
    pub num_entries: u8,
    pub hmac: serde_cbor::Value,
    /// Echo of the nonce the device sent in HelloDevice.
    pub nonce: ByteBuf,
    /// Challenge the device must sign in ProveDevice.
    pub nonce_prove_dv: ByteBuf,
    pub sig_info: SigInfo,
    pub kex_a: ByteBuf,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct ProveDevicePayload {
    pub nonce_prove_dv: ByteBuf,
    pub nonce_setup_dv: ByteBuf,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct SetupDevicePayload {
    pub rendezvous_info: RendezvousInfo,
    pub guid: ByteBuf,
    pub nonce: ByteBuf,
    pub owner_pubkey_hash: ByteBuf,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct DeviceServiceInfoReady {
    pub replacement_hmac: Option<ByteBuf>,
    pub max_owner_message_size: Option<u16>,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct DeviceServiceInfo {
    pub more: bool,
    pub service_info: Vec<(String, serde_cbor::Value)>,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct OwnerServiceInfo {
    pub more: bool,
    pub done: bool,
    pub service_info: Vec<(String, serde_cbor::Value)>,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct Done {
    pub nonce: ByteBuf,
}

// DI

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct DiAppStart {
    pub key_type: u8,
    pub key_enc: u8,
    pub serial_number: String,
    pub device_info: String,
    pub csr: ByteBuf,
}

/// Ownership voucher header subset returned by SetCredentials: the
/// identity DI assigns to the device.
#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct OvHeader {
    pub protocol_version: u16,
    pub guid: ByteBuf,
    pub rendezvous_info: RendezvousInfo,
    pub device_info: String,
    pub manufacturer_pubkey: ByteBuf,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct SetHmac {
    pub hmac: ByteBuf,
}
