use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fdo_credential_store::{DeviceCredential, RendezvousInfo};

use crate::config::OnboardConfig;
use crate::delay::{add_jitter, apply_delay};
use crate::directive::derive_directives;
use crate::discover::discover_owner_urls;
use crate::error::OnboardError;
use crate::protocol::{ProtocolClient, To2Outcome};

/// Fallback retry delay, applied jittered after the last directive
/// when no directive configured a delay of its own. Prevents
/// busy-looping through a delay-less rendezvous configuration.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Runs the ownership-transfer state machine until TO2 succeeds, the
/// owner signals credential reuse, or the operator cancels.
///
/// Returns `Ok(Some(credential))` when the owner rotated the
/// credential, `Ok(None)` on the explicit credential-reuse outcome,
/// `Err(Configuration)` if the credential carries no usable
/// rendezvous directives, and `Err(Canceled)` when the cancellation
/// token fired. Per-attempt TO1/TO2 failures never escape: the loop
/// replays the directive list indefinitely.
pub async fn transfer_ownership(
    cancel: &CancellationToken,
    client: &dyn ProtocolClient,
    rv_info: &RendezvousInfo,
    config: &OnboardConfig,
) -> Result<Option<DeviceCredential>, OnboardError> {
    let directives = derive_directives(rv_info);
    if directives.is_empty() {
        return Err(OnboardError::Configuration(
            "no rendezvous information found that's usable for the device".to_string(),
        ));
    }

    // Infinite retry: only success, explicit reuse, or cancellation
    // terminate this loop.
    loop {
        for (i, directive) in directives.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(OnboardError::Canceled);
            }
            let is_last_directive = i == directives.len() - 1;

            // Step 1: owner URLs via TO1, or directly via RV bypass.
            let (owner_urls, redirect) = discover_owner_urls(cancel, client, directive).await;

            // Step 2: attempt TO2 with each owner URL. A TO1 failure
            // left the list empty and skips this entirely.
            if !owner_urls.is_empty() {
                log::info!("Attempting TO2 protocol");
            }
            for (j, base_url) in owner_urls.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(OnboardError::Canceled);
                }
                let is_last_url = j == owner_urls.len() - 1;
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => return Err(OnboardError::Canceled),
                    attempt = client.to2(base_url, redirect.as_ref()) => attempt,
                };
                match attempt {
                    Ok(To2Outcome::NewCredential(credential)) => {
                        log::info!("TO2 succeeded, base URL: {}", base_url);
                        return Ok(Some(*credential));
                    }
                    Ok(To2Outcome::CredentialReuse) => {
                        log::info!("TO2 succeeded, base URL: {}", base_url);
                        return Ok(None);
                    }
                    Err(e) => {
                        log::error!("TO2 failed, base URL: {}, error: {}", base_url, e);
                    }
                }

                // Optional fixed wait between owner URLs of the same
                // directive, so different URLs of one server are not
                // hammered back to back. Not part of the FDO spec.
                if !is_last_url && !config.to2_retry_delay.is_zero() {
                    log::info!("Applying TO2 retry delay: {:?}", config.to2_retry_delay);
                    apply_delay(cancel, config.to2_retry_delay).await?;
                }
            }

            // Step 3: post-directive delay. Applies even when the
            // directive produced zero owner URLs; a delay-only
            // directive (RVDelaySec pattern) is valid configuration.
            if !directive.delay.is_zero() {
                let delay = add_jitter(directive.delay);
                log::info!("Applying directive delay: {:?}", delay);
                apply_delay(cancel, delay).await?;
            } else if is_last_directive {
                let delay = add_jitter(DEFAULT_RETRY_DELAY);
                log::info!("Applying default delay for last directive: {:?}", delay);
                apply_delay(cancel, delay).await?;
            }
            // Non-last directive without a delay: move on immediately,
            // the next directive is the backup rendezvous option.
        }
    }
}
