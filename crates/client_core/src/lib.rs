use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;
use futures::future::join_all;
use shared::{
    domain::{Assignment, AssignmentId, Identity, StatusTransition, SubmissionId, SubmissionRecord},
    error::ValidationError,
    protocol::CreateSubmissionRequest,
};
use storage::KeyValueStore;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

pub mod api;
pub mod error;
pub mod identity;
pub mod ledger;

pub use api::{ApiError, AssignmentApi, HttpAssignmentApi};
pub use error::ClientError;
pub use identity::IdentityStore;
pub use ledger::{MergeOutcome, SubmissionLedger};

const LOAD_ASSIGNMENTS_FAILED: &str = "Failed to load assignments";
const SUBMISSION_FAILED: &str = "Submission failed";
const REFRESH_FAILED: &str = "Failed to refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureContext {
    Identity,
    LoadAssignments,
    Submit,
    Refresh,
}

/// Notifications for whatever front end drives the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    AssignmentsLoaded { count: usize },
    SubmissionAccepted { record: SubmissionRecord },
    FeedbackReceived { record: SubmissionRecord },
    Error {
        context: FailureContext,
        message: String,
    },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::AssignmentsLoaded { count } => {
                write!(f, "{count} assignment(s) available")
            }
            SessionEvent::SubmissionAccepted { record } => write!(
                f,
                "Submission received for \"{}\"! Refresh it later to check for feedback.",
                record.assignment_title
            ),
            SessionEvent::FeedbackReceived { record } => write!(
                f,
                "Feedback received for \"{}\"!",
                record.assignment_title
            ),
            SessionEvent::Error { message, .. } => f.write_str(message),
        }
    }
}

/// Clears the in-flight flag however the submit attempt ends.
struct SubmitGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Session-scoped state for one student: identity gate, the assignment list
/// of this session, the persisted submission ledger and the submit guard.
pub struct StudentSession {
    api: Arc<dyn AssignmentApi>,
    identity: IdentityStore,
    ledger: SubmissionLedger,
    assignments: RwLock<Vec<Assignment>>,
    initial_load_done: AtomicBool,
    submit_in_flight: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl StudentSession {
    pub async fn open(
        api: Arc<dyn AssignmentApi>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Arc<Self>, ClientError> {
        let identity = IdentityStore::open(Arc::clone(&store)).await?;
        let ledger = SubmissionLedger::open(store).await?;
        let (events, _) = broadcast::channel(256);

        Ok(Arc::new(Self {
            api,
            identity,
            ledger,
            assignments: RwLock::new(Vec::new()),
            initial_load_done: AtomicBool::new(false),
            submit_in_flight: AtomicBool::new(false),
            events,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.identity.load().await
    }

    /// Kicks off the session. With a stored identity this performs the one
    /// assignment load of the session; without one the caller has to route
    /// to name entry.
    pub async fn start(&self) -> Option<Identity> {
        let identity = self.identity.load().await?;
        self.load_assignments_once().await;
        Some(identity)
    }

    pub async fn enter_identity(&self, raw_name: &str) -> Result<Identity, ClientError> {
        let had_identity = self.identity.load().await.is_some();
        let identity = match self.identity.set(raw_name).await {
            Ok(identity) => identity,
            Err(err) => {
                self.emit_failure(FailureContext::Identity, &err);
                return Err(err);
            }
        };

        if !had_identity {
            self.load_assignments_once().await;
        }
        Ok(identity)
    }

    async fn load_assignments_once(&self) {
        if self.initial_load_done.swap(true, Ordering::AcqRel) {
            return;
        }
        // Failures were already reported through the event stream.
        let _ = self.list_assignments().await;
    }

    /// Fetches the full assignment list and replaces the cached one. On
    /// failure the previous list stays as it was.
    pub async fn list_assignments(&self) -> Result<Vec<Assignment>, ClientError> {
        let result = self.fetch_assignments().await;
        if let Err(err) = &result {
            self.emit_failure(FailureContext::LoadAssignments, err);
        }
        result
    }

    async fn fetch_assignments(&self) -> Result<Vec<Assignment>, ClientError> {
        self.require_identity().await?;
        let assignments = self
            .api
            .list_assignments()
            .await
            .map_err(|source| ClientError::network(source, LOAD_ASSIGNMENTS_FAILED))?;

        *self.assignments.write().await = assignments.clone();
        info!(count = assignments.len(), "assignments: loaded");
        let _ = self.events.send(SessionEvent::AssignmentsLoaded {
            count: assignments.len(),
        });
        Ok(assignments)
    }

    pub async fn assignments(&self) -> Vec<Assignment> {
        self.assignments.read().await.clone()
    }

    pub async fn assignment(&self, assignment_id: &AssignmentId) -> Option<Assignment> {
        self.assignments
            .read()
            .await
            .iter()
            .find(|assignment| assignment.assignment_id == *assignment_id)
            .cloned()
    }

    pub fn is_submitting(&self) -> bool {
        self.submit_in_flight.load(Ordering::Acquire)
    }

    /// Submits `content` for `assignment` under the current identity and
    /// records the acknowledged submission as `pending`. Only one submit may
    /// be outstanding at a time.
    pub async fn submit(
        &self,
        assignment: &Assignment,
        content: &str,
    ) -> Result<SubmissionRecord, ClientError> {
        let result = match SubmitGuard::acquire(&self.submit_in_flight) {
            Some(_guard) => self.submit_once(assignment, content).await,
            None => Err(ClientError::SubmissionInFlight),
        };
        if let Err(err) = &result {
            self.emit_failure(FailureContext::Submit, err);
        }
        result
    }

    async fn submit_once(
        &self,
        assignment: &Assignment,
        content: &str,
    ) -> Result<SubmissionRecord, ClientError> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        let identity = self.require_identity().await?;

        let request = CreateSubmissionRequest {
            assignment_id: assignment.assignment_id.clone(),
            student_name: identity.name().to_string(),
            content: content.to_string(),
        };
        let submission_id = self
            .api
            .create_submission(&request)
            .await
            .map_err(|source| ClientError::network(source, SUBMISSION_FAILED))?;

        let record = SubmissionRecord::pending(submission_id, assignment, Utc::now());
        let record = self.ledger.create(record).await.inspect_err(|err| {
            warn!(
                assignment_id = %assignment.assignment_id,
                error = %err,
                "submit: server accepted submission but it could not be recorded locally"
            );
        })?;

        let _ = self.events.send(SessionEvent::SubmissionAccepted {
            record: record.clone(),
        });
        Ok(record)
    }

    /// Pulls the server's current status for one submission and merges it
    /// into the ledger entry with that id.
    pub async fn refresh(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SubmissionRecord, ClientError> {
        let result = self.refresh_once(submission_id).await;
        if let Err(err) = &result {
            self.emit_failure(FailureContext::Refresh, err);
        }
        result
    }

    async fn refresh_once(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<SubmissionRecord, ClientError> {
        self.require_identity().await?;
        if !self.ledger.contains(submission_id).await {
            return Err(ClientError::UnknownSubmission(submission_id.clone()));
        }

        let update = self
            .api
            .fetch_submission(submission_id)
            .await
            .map_err(|source| ClientError::network(source, REFRESH_FAILED))?;
        let outcome = self
            .ledger
            .merge_status(submission_id, update.status, update.feedback)
            .await?;

        if outcome.transition == StatusTransition::Evaluated {
            let _ = self.events.send(SessionEvent::FeedbackReceived {
                record: outcome.record.clone(),
            });
        }
        Ok(outcome.record)
    }

    /// Refreshes every submission that has not been evaluated yet,
    /// concurrently. Results come back in ledger order.
    pub async fn refresh_pending(
        &self,
    ) -> Vec<(SubmissionId, Result<SubmissionRecord, ClientError>)> {
        let pending: Vec<SubmissionId> = self
            .ledger
            .records()
            .await
            .into_iter()
            .filter(|record| !record.status.is_evaluated())
            .map(|record| record.submission_id)
            .collect();

        join_all(pending.into_iter().map(|submission_id| async move {
            let result = self.refresh(&submission_id).await;
            (submission_id, result)
        }))
        .await
    }

    pub async fn submissions(&self) -> Vec<SubmissionRecord> {
        self.ledger.records().await
    }

    pub async fn submission(&self, submission_id: &SubmissionId) -> Option<SubmissionRecord> {
        self.ledger.find(submission_id).await
    }

    async fn require_identity(&self) -> Result<Identity, ClientError> {
        self.identity
            .load()
            .await
            .ok_or(ClientError::MissingIdentity)
    }

    fn emit_failure(&self, context: FailureContext, err: &ClientError) {
        match err {
            ClientError::Network { source, .. } => {
                warn!(?context, error = %source, "session: request failed");
            }
            other => warn!(?context, error = %other, "session: operation failed"),
        }
        let _ = self.events.send(SessionEvent::Error {
            context,
            message: err.to_string(),
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
