use std::str::FromStr;
use std::time::Duration;

use crate::error::OnboardError;

/// COSE cipher suites accepted for the TO2 encrypted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    A128Gcm,
    A192Gcm,
    A256Gcm,
    AesCcm64128128,
    AesCcm64128256,
    CoseAes128Cbc,
    CoseAes128Ctr,
    CoseAes256Cbc,
    CoseAes256Ctr,
}

impl CipherSuite {
    pub fn name(&self) -> &'static str {
        match self {
            CipherSuite::A128Gcm => "A128GCM",
            CipherSuite::A192Gcm => "A192GCM",
            CipherSuite::A256Gcm => "A256GCM",
            CipherSuite::AesCcm64128128 => "AES-CCM-64-128-128",
            CipherSuite::AesCcm64128256 => "AES-CCM-64-128-256",
            CipherSuite::CoseAes128Cbc => "COSEAES128CBC",
            CipherSuite::CoseAes128Ctr => "COSEAES128CTR",
            CipherSuite::CoseAes256Cbc => "COSEAES256CBC",
            CipherSuite::CoseAes256Ctr => "COSEAES256CTR",
        }
    }
}

impl FromStr for CipherSuite {
    type Err = OnboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A128GCM" => Ok(CipherSuite::A128Gcm),
            "A192GCM" => Ok(CipherSuite::A192Gcm),
            "A256GCM" => Ok(CipherSuite::A256Gcm),
            "AES-CCM-64-128-128" => Ok(CipherSuite::AesCcm64128128),
            "AES-CCM-64-128-256" => Ok(CipherSuite::AesCcm64128256),
            "COSEAES128CBC" => Ok(CipherSuite::CoseAes128Cbc),
            "COSEAES128CTR" => Ok(CipherSuite::CoseAes128Ctr),
            "COSEAES256CBC" => Ok(CipherSuite::CoseAes256Cbc),
            "COSEAES256CTR" => Ok(CipherSuite::CoseAes256Ctr),
            other => Err(OnboardError::Configuration(format!(
                "invalid cipher suite: {}",
                other
            ))),
        }
    }
}

/// Key exchange suites for TO2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexSuite {
    DhkexId14,
    DhkexId15,
    Asymkex2048,
    Asymkex3072,
    Ecdh256,
    Ecdh384,
}

impl KexSuite {
    pub fn name(&self) -> &'static str {
        match self {
            KexSuite::DhkexId14 => "DHKEXid14",
            KexSuite::DhkexId15 => "DHKEXid15",
            KexSuite::Asymkex2048 => "ASYMKEX2048",
            KexSuite::Asymkex3072 => "ASYMKEX3072",
            KexSuite::Ecdh256 => "ECDH256",
            KexSuite::Ecdh384 => "ECDH384",
        }
    }
}

impl FromStr for KexSuite {
    type Err = OnboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DHKEXid14" => Ok(KexSuite::DhkexId14),
            "DHKEXid15" => Ok(KexSuite::DhkexId15),
            "ASYMKEX2048" => Ok(KexSuite::Asymkex2048),
            "ASYMKEX3072" => Ok(KexSuite::Asymkex3072),
            "ECDH256" => Ok(KexSuite::Ecdh256),
            "ECDH384" => Ok(KexSuite::Ecdh384),
            other => Err(OnboardError::Configuration(format!(
                "invalid key exchange suite: {}",
                other
            ))),
        }
    }
}

/// Immutable onboarding configuration, built once at startup and
/// passed explicitly into the transfer loop. Never read from ambient
/// state mid-loop.
#[derive(Debug, Clone)]
pub struct OnboardConfig {
    pub cipher_suite: CipherSuite,
    pub kex_suite: KexSuite,
    pub max_serviceinfo_size: u16,
    pub allow_credential_reuse: bool,
    /// Fixed (non-jittered) wait between failed TO2 attempts against
    /// different owner URLs from the same directive. Zero disables it.
    /// Operator convenience, not part of the FDO spec.
    pub to2_retry_delay: Duration,
    pub insecure_tls: bool,
    pub resale: bool,
}

impl Default for OnboardConfig {
    fn default() -> Self {
        OnboardConfig {
            cipher_suite: CipherSuite::A128Gcm,
            kex_suite: KexSuite::Ecdh384,
            max_serviceinfo_size: 1300,
            allow_credential_reuse: false,
            to2_retry_delay: Duration::ZERO,
            insecure_tls: false,
            resale: false,
        }
    }
}
