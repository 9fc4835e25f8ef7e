use thiserror::Error;

/// Input rejected before anything reaches the network or the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("Please enter your submission content")]
    EmptyContent,
}
