use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// FDO transport protocol values (FDO 1.1 section 3.3.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum TransportProtocol {
    Tcp = 1,
    Tls = 2,
    Http = 3,
    CoapTcp = 4,
    Https = 5,
    CoapUdp = 6,
}

impl TransportProtocol {
    pub fn scheme(&self) -> Option<&'static str> {
        match self {
            TransportProtocol::Http => Some("http"),
            TransportProtocol::Https => Some("https"),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            TransportProtocol::Https => 443,
            _ => 80,
        }
    }
}

/// One rendezvous directive as stored in the device credential: a set
/// of candidate server addresses plus the device-side modifiers that
/// matter for onboarding (delay, bypass).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RvDirectiveInfo {
    pub protocol: TransportProtocol,
    pub dns_name: Option<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub port: u16,
    pub delay_secs: u32,
    pub bypass: bool,
}

impl RvDirectiveInfo {
    /// Expands the directive into base URLs, DNS name first, then IP
    /// addresses, matching the ordering the device credential's
    /// rendezvous info prescribes. Non-HTTP(S) protocols produce no
    /// URLs; the device cannot use them.
    pub fn get_urls(&self) -> Vec<String> {
        let scheme = match self.protocol.scheme() {
            Some(scheme) => scheme,
            None => return Vec::new(),
        };
        let port = if self.port == 0 {
            self.protocol.default_port()
        } else {
            self.port
        };

        let mut urls = Vec::new();
        if let Some(dns_name) = &self.dns_name {
            urls.push(format!("{}://{}:{}", scheme, dns_name, port));
        }
        for ip_address in &self.ip_addresses {
            match ip_address {
                IpAddr::V4(ip) => urls.push(format!("{}://{}:{}", scheme, ip, port)),
                IpAddr::V6(ip) => urls.push(format!("{}://[{}]:{}", scheme, ip, port)),
            }
        }
        urls
    }
}

/// The ordered rendezvous instruction list from the device credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RendezvousInfo(pub Vec<RvDirectiveInfo>);

impl RendezvousInfo {
    pub fn directives(&self) -> &[RvDirectiveInfo] {
        &self.0
    }
}
