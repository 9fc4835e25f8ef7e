//! REST boundary to the assignment service.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Assignment, SubmissionId},
    protocol::{
        AssignmentsResponse, CreateSubmissionRequest, CreateSubmissionResponse, ErrorBody,
        SubmissionStatusResponse,
    },
};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("server rejected request with status {status}: {}", .message.as_deref().unwrap_or("no error message"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed server response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Error text supplied by the server, if it sent any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }
}

#[async_trait]
pub trait AssignmentApi: Send + Sync {
    async fn list_assignments(&self) -> Result<Vec<Assignment>, ApiError>;
    async fn create_submission(
        &self,
        request: &CreateSubmissionRequest,
    ) -> Result<SubmissionId, ApiError>;
    async fn fetch_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SubmissionStatusResponse, ApiError>;
}

pub struct HttpAssignmentApi {
    http: Client,
    base_url: Url,
}

impl HttpAssignmentApi {
    pub fn new(server_url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build http client")?;
        Self::with_client(http, server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self> {
        let base_url = Url::parse(server_url.trim())
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server_url must be an http:// or https:// url, got '{server_url}'"
            ));
        }
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl AssignmentApi for HttpAssignmentApi {
    async fn list_assignments(&self) -> Result<Vec<Assignment>, ApiError> {
        let url = self.endpoint(&["assignments"])?;
        debug!(%url, "api: listing assignments");
        let response = self.http.get(url).send().await.map_err(transport)?;
        let body: AssignmentsResponse = read_json(response).await?;
        Ok(body.assignments)
    }

    async fn create_submission(
        &self,
        request: &CreateSubmissionRequest,
    ) -> Result<SubmissionId, ApiError> {
        let url = self.endpoint(&["submissions"])?;
        debug!(%url, assignment_id = %request.assignment_id, "api: creating submission");
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let body: CreateSubmissionResponse = read_json(response).await?;
        Ok(body.submission_id)
    }

    async fn fetch_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SubmissionStatusResponse, ApiError> {
        let url = self.endpoint(&["submissions", submission_id.as_str()])?;
        debug!(%url, "api: fetching submission status");
        let response = self.http.get(url).send().await.map_err(transport)?;
        read_json(response).await
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .map(|body| body.error);
        return Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
