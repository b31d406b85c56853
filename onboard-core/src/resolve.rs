use std::net::IpAddr;

use crate::protocol::To2AddressEntry;

/// Expands one TO2 address entry into connectable base URLs.
///
/// Both a DNS-based and an IP-based URL may be produced for the same
/// entry; they are separate candidates, not alternatives. A DNS name
/// is only emitted if it resolves right now (live lookup, the cached
/// result from a previous pass may be stale). Entries with an
/// unsupported transport, or with neither DNS nor IP, are dropped with
/// a log line; they never abort the surrounding expansion.
pub async fn resolve_owner_urls(entry: &To2AddressEntry) -> Vec<String> {
    let mut urls = Vec::new();

    if entry.dns.is_none() && entry.ip.is_none() {
        log::error!("Both IP and DNS can't be null");
        return urls;
    }

    let scheme = match entry.protocol.scheme() {
        Some(scheme) => scheme,
        None => {
            log::error!("Unsupported transport protocol: {:?}", entry.protocol);
            return urls;
        }
    };
    let port = if entry.port == 0 {
        entry.protocol.default_port()
    } else {
        entry.port
    };

    if let Some(dns_name) = &entry.dns {
        if is_resolvable_dns(dns_name, port).await {
            urls.push(format!("{}://{}:{}", scheme, dns_name, port));
        } else {
            log::warn!("DNS address is not resolvable: {}", dns_name);
        }
    }

    if let Some(ip) = &entry.ip {
        match ip {
            IpAddr::V4(ip) => urls.push(format!("{}://{}:{}", scheme, ip, port)),
            IpAddr::V6(ip) => urls.push(format!("{}://[{}]:{}", scheme, ip, port)),
        }
    }

    urls
}

async fn is_resolvable_dns(dns_name: &str, port: u16) -> bool {
    match tokio::net::lookup_host((dns_name, port)).await {
        Ok(mut addrs) => addrs.next().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdo_credential_store::TransportProtocol;

    fn entry(
        protocol: TransportProtocol,
        dns: Option<&str>,
        ip: Option<&str>,
        port: u16,
    ) -> To2AddressEntry {
        To2AddressEntry {
            protocol,
            dns: dns.map(|s| s.to_string()),
            ip: ip.map(|s| s.parse().unwrap()),
            port,
        }
    }

    #[tokio::test]
    async fn test_ip_only_entry() {
        let urls =
            resolve_owner_urls(&entry(TransportProtocol::Http, None, Some("192.0.2.7"), 8080))
                .await;
        assert_eq!(urls, vec!["http://192.0.2.7:8080"]);
    }

    #[tokio::test]
    async fn test_default_ports() {
        let urls =
            resolve_owner_urls(&entry(TransportProtocol::Https, None, Some("192.0.2.7"), 0))
                .await;
        assert_eq!(urls, vec!["https://192.0.2.7:443"]);
    }

    #[tokio::test]
    async fn test_both_null_rejected() {
        let urls = resolve_owner_urls(&entry(TransportProtocol::Http, None, None, 8080)).await;
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_transport_rejected() {
        let urls =
            resolve_owner_urls(&entry(TransportProtocol::Tcp, None, Some("192.0.2.7"), 8080))
                .await;
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_resolvable_dns_and_ip_both_emitted() {
        // localhost resolves everywhere the test suite runs.
        let urls = resolve_owner_urls(&entry(
            TransportProtocol::Http,
            Some("localhost"),
            Some("127.0.0.1"),
            8080,
        ))
        .await;
        assert_eq!(
            urls,
            vec!["http://localhost:8080", "http://127.0.0.1:8080"]
        );
    }

    #[tokio::test]
    async fn test_unresolvable_dns_dropped_ip_kept() {
        let urls = resolve_owner_urls(&entry(
            TransportProtocol::Http,
            Some("unresolvable.invalid"),
            Some("127.0.0.1"),
            8080,
        ))
        .await;
        assert_eq!(urls, vec!["http://127.0.0.1:8080"]);
    }
}
