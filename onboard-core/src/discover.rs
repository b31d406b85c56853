use tokio_util::sync::CancellationToken;

use crate::directive::RvDirective;
use crate::protocol::{ProtocolClient, To1Redirect};
use crate::resolve::resolve_owner_urls;

/// Discovers owner URLs for one rendezvous directive.
///
/// With `bypass` set, the directive's URL list is returned verbatim
/// and no TO1 exchange happens. Otherwise TO1 is attempted against
/// each rendezvous URL in order until one succeeds; the redirect's
/// address list is then expanded into owner URLs. All TO1 attempts
/// failing is not an error: the empty result sends the outer loop
/// straight to its delay phase. Likewise a successful TO1 carrying no
/// usable addresses is a valid, manufacturer-configured outcome.
pub async fn discover_owner_urls(
    cancel: &CancellationToken,
    client: &dyn ProtocolClient,
    directive: &RvDirective,
) -> (Vec<String>, Option<To1Redirect>) {
    if directive.bypass {
        log::info!("RV bypass enabled, skipping TO1 protocol");
        for url in &directive.urls {
            log::info!("Using Owner URL from bypass directive: {}", url);
        }
        return (directive.urls.clone(), None);
    }

    log::info!("Attempting TO1 protocol");
    let mut redirect = None;
    for url in &directive.urls {
        if cancel.is_cancelled() {
            return (Vec::new(), None);
        }
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return (Vec::new(), None),
            attempt = client.to1(url) => attempt,
        };
        match attempt {
            Ok(to1d) => {
                log::info!("TO1 succeeded, base URL: {}", url);
                redirect = Some(to1d);
                break;
            }
            Err(e) => {
                log::error!("TO1 failed, base URL: {}, error: {}", url, e);
                continue;
            }
        }
    }

    // Empty owner URLs is valid (delay-only directive); individual
    // failures were already logged in the loop.
    let redirect = match redirect {
        Some(redirect) => redirect,
        None => {
            log::info!("All TO1 attempts failed for this directive");
            return (Vec::new(), None);
        }
    };

    let mut owner_urls = Vec::new();
    for address in &redirect.addresses {
        owner_urls.extend(resolve_owner_urls(address).await);
    }

    if owner_urls.is_empty() {
        log::info!("TO1 succeeded but no valid TO2 addresses found");
    } else {
        log::info!("Got TO2 addresses: {:?}", owner_urls);
    }

    (owner_urls, Some(redirect))
}
