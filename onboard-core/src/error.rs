use thiserror::Error;

#[derive(Debug, Error)]
pub enum OnboardError {
    /// Invalid configuration, surfaced before any network activity.
    /// Not retryable.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The shared cancellation token fired; the loop stopped without
    /// starting further attempts or waits.
    #[error("Onboarding canceled")]
    Canceled,
}

impl OnboardError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, OnboardError::Canceled)
    }
}
