use checkhost::{ProviderError, SpecError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("invalid check: {0}")]
    Spec(#[from] SpecError),
}

impl MonitorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MonitorError::Provider(ProviderError::Cancelled))
    }
}
