use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::OnboardError;

/// Jitter applied to retry delays, ±25% as required by FDO 1.1
/// section 3.7 to avoid synchronized retry storms across a fleet.
const JITTER_FRACTION: f64 = 0.25;

/// Returns `delay` randomized by ±25%. A zero delay stays exactly
/// zero; callers rely on zero meaning "disabled".
pub fn add_jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    let jitter = JITTER_FRACTION * (2.0 * rng.gen::<f64>() - 1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter))
}

/// Sleeps for `delay` or until the cancellation token fires, whichever
/// comes first. A zero delay returns immediately without suspending.
pub async fn apply_delay(
    cancel: &CancellationToken,
    delay: Duration,
) -> Result<(), OnboardError> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(OnboardError::Canceled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_secs(120);
        for _ in 0..1000 {
            let jittered = add_jitter(base);
            assert!(jittered >= Duration::from_secs(90), "{:?}", jittered);
            assert!(jittered <= Duration::from_secs(150), "{:?}", jittered);
        }
    }

    #[test]
    fn test_jitter_zero_stays_zero() {
        for _ in 0..100 {
            assert_eq!(add_jitter(Duration::ZERO), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_delay_elapses() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        apply_delay(&cancel, Duration::from_secs(30)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_delay_zero_is_immediate() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        apply_delay(&cancel, Duration::ZERO).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_delay_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { apply_delay(&cancel, Duration::from_secs(3600)).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(OnboardError::Canceled)));
    }
}
