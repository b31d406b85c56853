//! Device initialization (DI): generate the device key and HMAC
//! secret, register with the manufacturer, and persist the resulting
//! credential.

use anyhow::{anyhow, bail, Context, Result};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::{X509NameBuilder, X509ReqBuilder};
use rand::RngCore;

use fdo_client_util::device_info;
use fdo_credential_store::{DeviceCredential, DeviceState, FileCredentialStore};
use fdo_http_client::ServiceClient;

use crate::config::{DeviceInitConfig, KeyEncoding, KeyType};
use crate::credential::update_credential;
use crate::wire;

// FDO public key type values (FDO 1.1 section 3.3.4).
const KEY_TYPE_RSA2048RESTR: u8 = 1;
const KEY_TYPE_RSAPKCS: u8 = 5;
const KEY_TYPE_SECP256R1: u8 = 10;
const KEY_TYPE_SECP384R1: u8 = 11;

const KEY_ENC_X509: u8 = 1;
const KEY_ENC_X5CHAIN: u8 = 2;
const KEY_ENC_COSE: u8 = 3;

pub async fn run(store: &FileCredentialStore, config: &DeviceInitConfig) -> Result<()> {
    // Fresh secret and key for this device identity.
    let mut secret = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);

    let key = generate_key(config.key).context("error generating device key")?;
    let private_key_der = key
        .private_key_to_der()
        .context("error serializing device key")?;

    let csr = build_csr(&key).context("error creating CSR for device certificate chain")?;

    let serial_number = match &config.serial_number {
        Some(serial) => serial.clone(),
        None => match device_info::get_serial() {
            Ok(serial) => serial,
            Err(e) => {
                log::warn!("error getting device serial number: {}", e);
                String::new()
            }
        },
    };

    let device_info = match (&config.device_info, &config.device_info_mac) {
        (Some(info), _) => info.clone(),
        (None, Some(iface)) => device_info::get_mac(iface)
            .with_context(|| format!("error getting device information from iface {}", iface))?,
        (None, None) => {
            if serial_number.is_empty() {
                bail!(
                    "device info cannot be determined automatically. \
                     Please specify either --serial-number or --device-info (or both)"
                );
            }
            serial_number.clone()
        }
    };
    log::debug!(
        "Starting Device Initialization, serial number: {:?}, device info: {:?}",
        serial_number,
        device_info
    );

    let app_start = serde_cbor::to_vec(&wire::DiAppStart {
        key_type: key_type_value(config.key),
        key_enc: key_enc_value(config.key_enc),
        serial_number,
        device_info,
        csr: serde_bytes::ByteBuf::from(csr),
    })
    .context("error encoding AppStart")?;

    let mut client = ServiceClient::new(&config.server_url, config.insecure_tls)
        .context("error creating manufacturer client")?;
    let set_credentials = client
        .send_request(wire::DI_APP_START, app_start, wire::DI_SET_CREDENTIALS)
        .await
        .context("error sending AppStart")?;
    let ov_header: wire::OvHeader =
        serde_cbor::from_slice(&set_credentials).context("error parsing SetCredentials")?;

    // The manufacturer extends the voucher from this HMAC over the
    // header it just assigned.
    let header_hmac = compute_hmac(&secret, &set_credentials)?;
    let set_hmac = serde_cbor::to_vec(&wire::SetHmac {
        hmac: serde_bytes::ByteBuf::from(header_hmac),
    })
    .context("error encoding SetHMAC")?;
    client
        .send_request(wire::DI_SET_HMAC, set_hmac, wire::DI_DONE)
        .await
        .context("error sending SetHMAC")?;

    let guid = uuid::Uuid::from_slice(&ov_header.guid)
        .map_err(|e| anyhow!("malformed GUID from manufacturer: {}", e))?;
    let manufacturer_pubkey_hash = hash(MessageDigest::sha256(), &ov_header.manufacturer_pubkey)
        .context("error hashing manufacturer public key")?
        .to_vec();

    update_credential(
        store,
        DeviceCredential {
            active: true,
            guid,
            device_info: ov_header.device_info,
            rendezvous_info: ov_header.rendezvous_info,
            manufacturer_pubkey_hash,
            private_key_der,
            hmac_secret: secret,
        },
        DeviceState::PreTo1,
    )?;

    log::info!("Device Initialization complete, GUID: {}", guid);
    Ok(())
}

fn generate_key(key_type: KeyType) -> Result<PKey<Private>> {
    let key = match key_type {
        KeyType::Ec256 => {
            let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
            PKey::from_ec_key(EcKey::generate(&group)?)?
        }
        KeyType::Ec384 => {
            let group = EcGroup::from_curve_name(Nid::SECP384R1)?;
            PKey::from_ec_key(EcKey::generate(&group)?)?
        }
        KeyType::Rsa2048 => PKey::from_rsa(Rsa::generate(2048)?)?,
        KeyType::Rsa3072 => PKey::from_rsa(Rsa::generate(3072)?)?,
    };
    Ok(key)
}

fn build_csr(key: &PKey<Private>) -> Result<Vec<u8>> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", "device.fdo-client")?;
    let name = name.build();

    let mut builder = X509ReqBuilder::new()?;
    builder.set_subject_name(&name)?;
    builder.set_pubkey(key)?;
    builder.sign(key, MessageDigest::sha256())?;
    Ok(builder.build().to_der()?)
}

fn compute_hmac(secret: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let key = PKey::hmac(secret)?;
    let mut signer = Signer::new(MessageDigest::sha384(), &key)?;
    signer.update(data)?;
    Ok(signer.sign_to_vec()?)
}

fn key_type_value(key_type: KeyType) -> u8 {
    match key_type {
        KeyType::Ec256 => KEY_TYPE_SECP256R1,
        KeyType::Ec384 => KEY_TYPE_SECP384R1,
        KeyType::Rsa2048 => KEY_TYPE_RSA2048RESTR,
        KeyType::Rsa3072 => KEY_TYPE_RSAPKCS,
    }
}

fn key_enc_value(key_enc: KeyEncoding) -> u8 {
    match key_enc {
        KeyEncoding::X509 => KEY_ENC_X509,
        KeyEncoding::X5Chain => KEY_ENC_X5CHAIN,
        KeyEncoding::Cose => KEY_ENC_COSE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ec_keys_round_trip_der() {
        for key_type in [KeyType::Ec256, KeyType::Ec384] {
            let key = generate_key(key_type).unwrap();
            let der = key.private_key_to_der().unwrap();
            assert!(PKey::private_key_from_der(&der).is_ok());
        }
    }

    #[test]
    fn test_csr_is_parseable() {
        let key = generate_key(KeyType::Ec256).unwrap();
        let der = build_csr(&key).unwrap();
        let req = openssl::x509::X509Req::from_der(&der).unwrap();
        assert!(req.verify(&key).unwrap());
    }

    #[test]
    fn test_hmac_is_deterministic() {
        let a = compute_hmac(b"secret", b"header").unwrap();
        let b = compute_hmac(b"secret", b"header").unwrap();
        let c = compute_hmac(b"other", b"header").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 48);
    }

    #[test]
    fn test_key_type_values() {
        assert_eq!(key_type_value(KeyType::Ec256), 10);
        assert_eq!(key_type_value(KeyType::Ec384), 11);
        assert_eq!(key_type_value(KeyType::Rsa2048), 1);
        assert_eq!(key_type_value(KeyType::Rsa3072), 5);
    }
}
