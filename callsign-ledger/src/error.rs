use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for allocation calls.
pub type AllocationResult<T> = Result<T, AllocationError>;

/// Error surfaced by ledger store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or answered outside its contract.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The stored document failed structural validation.
    #[error("invalid ledger document: {0}")]
    InvalidDocument(String),
}

impl StoreError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn invalid(err: impl std::fmt::Display) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidDocument(value.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Error returned to callers of the allocator.
///
/// `Transport` and `InvalidState` are terminal for the call; `Contention`
/// means the retry budget ran out and the caller may try again later.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("store transport failure: {0}")]
    Transport(String),
    #[error("allocation contention: gave up after {attempts} conflicting writes")]
    Contention { attempts: u32 },
    #[error("invalid ledger state: {0}")]
    InvalidState(String),
    #[error("allocation cancelled before commit")]
    Cancelled,
}

impl From<StoreError> for AllocationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Transport(msg) => Self::Transport(msg),
            StoreError::InvalidDocument(msg) => Self::InvalidState(msg),
        }
    }
}
