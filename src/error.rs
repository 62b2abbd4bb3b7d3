use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpecfitError {
    #[error("Need to provide data! No observation set was given to the sampler")]
    MissingData,
    #[error("Invalid observation set: {reason}")]
    InvalidData { reason: String },
    #[error("Invalid sampler settings: {reason}")]
    InvalidSettings { reason: String },
    #[error("All {num_walkers} walkers have a non-finite log probability")]
    AllWalkersNonFinite { num_walkers: usize },
    #[error("The sampler has no stored draws")]
    EmptyChain,
    #[error("Blob slot {slot} can not be used as model curve: {reason}")]
    BlobSlot { slot: usize, reason: String },
    #[error("Logp function returned unrecoverable error")]
    LogpFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, SpecfitError>;

impl SpecfitError {
    pub(crate) fn invalid_data(reason: impl Into<String>) -> Self {
        SpecfitError::InvalidData {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_settings(reason: impl Into<String>) -> Self {
        SpecfitError::InvalidSettings {
            reason: reason.into(),
        }
    }
}

/// Errors that happen when we evaluate the model or the log probability
pub trait LogpError: std::error::Error {
    /// Unrecoverable errors during logp computation stop sampling,
    /// recoverable errors reject the proposal.
    fn is_recoverable(&self) -> bool;
}

impl LogpError for std::convert::Infallible {
    fn is_recoverable(&self) -> bool {
        match *self {}
    }
}
