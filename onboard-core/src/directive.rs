use std::time::Duration;

use fdo_credential_store::RendezvousInfo;

/// One parsed rendezvous directive, immutable for the lifetime of a
/// transfer-loop invocation. The loop replays the same directive list
/// on every pass; nothing is re-derived between iterations.
#[derive(Debug, Clone)]
pub struct RvDirective {
    /// Candidate base URLs in attempt order. With `bypass` set these
    /// are owner URLs; otherwise they are rendezvous server URLs.
    pub urls: Vec<String>,
    pub bypass: bool,
    /// Post-directive delay. Zero means unset.
    pub delay: Duration,
}

/// Derives the attemptable directive list from the credential's
/// rendezvous info. Directives the device cannot use (no HTTP(S)
/// URLs) are dropped with a log line; an empty result means the
/// credential carries no usable rendezvous information at all.
pub fn derive_directives(rv_info: &RendezvousInfo) -> Vec<RvDirective> {
    let mut directives = Vec::new();
    for info in rv_info.directives() {
        let urls = info.get_urls();
        if urls.is_empty() {
            log::warn!(
                "Skipping rendezvous directive without usable URLs: {:?}",
                info
            );
            continue;
        }
        directives.push(RvDirective {
            urls,
            bypass: info.bypass,
            delay: Duration::from_secs(u64::from(info.delay_secs)),
        });
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdo_credential_store::{RvDirectiveInfo, TransportProtocol};

    #[test]
    fn test_derive_keeps_order_and_delay() {
        let rv_info = RendezvousInfo(vec![
            RvDirectiveInfo {
                protocol: TransportProtocol::Http,
                dns_name: Some("primary.example.com".to_string()),
                ip_addresses: vec![],
                port: 8041,
                delay_secs: 10,
                bypass: false,
            },
            RvDirectiveInfo {
                protocol: TransportProtocol::Https,
                dns_name: Some("backup.example.com".to_string()),
                ip_addresses: vec![],
                port: 0,
                delay_secs: 0,
                bypass: true,
            },
        ]);

        let directives = derive_directives(&rv_info);
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].urls, vec!["http://primary.example.com:8041"]);
        assert_eq!(directives[0].delay, Duration::from_secs(10));
        assert!(!directives[0].bypass);
        assert_eq!(directives[1].urls, vec!["https://backup.example.com:443"]);
        assert_eq!(directives[1].delay, Duration::ZERO);
        assert!(directives[1].bypass);
    }

    #[test]
    fn test_derive_drops_unusable_directives() {
        let rv_info = RendezvousInfo(vec![RvDirectiveInfo {
            protocol: TransportProtocol::CoapUdp,
            dns_name: Some("coap.example.com".to_string()),
            ip_addresses: vec![],
            port: 5683,
            delay_secs: 0,
            bypass: false,
        }]);
        assert!(derive_directives(&rv_info).is_empty());
    }
}
