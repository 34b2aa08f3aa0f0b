use thiserror::Error;

/// Failures talking to the probing provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected the check: {0}")]
    Rejected(String),

    #[error("unexpected provider response: {0}")]
    Decode(String),

    #[error("no node answered after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    #[error("polling cancelled")]
    Cancelled,
}

/// Invalid check specification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("tcp checks require a port")]
    MissingPort,

    #[error("port is only valid for tcp checks")]
    UnexpectedPort,

    #[error("invalid http target {target}: {reason}")]
    InvalidUrl { target: String, reason: String },

    #[error("unknown check mode: {0}")]
    UnknownMode(String),
}
