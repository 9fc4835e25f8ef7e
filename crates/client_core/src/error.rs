use shared::{domain::SubmissionId, error::ValidationError};
use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The request failed or the server refused it. `message` is what the
    /// user sees: the server's own text when it sent one.
    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: ApiError,
    },
    #[error("no student name set; enter your name first")]
    MissingIdentity,
    #[error("a submission is already in progress")]
    SubmissionInFlight,
    #[error("submission {0} is not in the local ledger")]
    UnknownSubmission(SubmissionId),
    #[error("submission {0} is already in the local ledger")]
    DuplicateSubmission(SubmissionId),
    #[error("failed to persist '{key}': {source}")]
    Persistence {
        key: &'static str,
        source: anyhow::Error,
    },
}

impl ClientError {
    pub fn network(source: ApiError, fallback: &str) -> Self {
        let message = source.server_message().unwrap_or(fallback).to_string();
        Self::Network { message, source }
    }

    pub fn persistence(key: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Persistence {
            key,
            source: source.into(),
        }
    }

    /// Transient failures the user can retry by re-triggering the action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Network { .. }
                | ClientError::SubmissionInFlight
                | ClientError::Persistence { .. }
        )
    }
}
