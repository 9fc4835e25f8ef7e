//! Locally persisted submission ledger.
//!
//! The ledger is a client-side cache of everything this student submitted,
//! newest first. The server is only authoritative for `status` and
//! `feedback`; every mutation is read-modify-write under one lock, and the
//! in-memory copy only changes after the store accepted the new ledger.

use std::sync::Arc;

use shared::domain::{
    Feedback, StatusTransition, SubmissionId, SubmissionRecord, SubmissionStatus,
};
use storage::KeyValueStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ClientError;

pub const SUBMISSIONS_KEY: &str = "mySubmissions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub record: SubmissionRecord,
    pub transition: StatusTransition,
}

pub struct SubmissionLedger {
    store: Arc<dyn KeyValueStore>,
    records: Mutex<Vec<SubmissionRecord>>,
}

impl SubmissionLedger {
    pub async fn open(store: Arc<dyn KeyValueStore>) -> Result<Self, ClientError> {
        let raw = store
            .get(SUBMISSIONS_KEY)
            .await
            .map_err(|source| ClientError::persistence(SUBMISSIONS_KEY, source))?;
        let records = raw.as_deref().map(decode_ledger).unwrap_or_default();
        info!(count = records.len(), "ledger: loaded");

        Ok(Self {
            store,
            records: Mutex::new(records),
        })
    }

    pub async fn records(&self) -> Vec<SubmissionRecord> {
        self.records.lock().await.clone()
    }

    pub async fn find(&self, submission_id: &SubmissionId) -> Option<SubmissionRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|record| record.submission_id == *submission_id)
            .cloned()
    }

    pub async fn contains(&self, submission_id: &SubmissionId) -> bool {
        self.find(submission_id).await.is_some()
    }

    /// Prepends a freshly acknowledged submission and persists the ledger.
    pub async fn create(&self, record: SubmissionRecord) -> Result<SubmissionRecord, ClientError> {
        let mut records = self.records.lock().await;
        if records
            .iter()
            .any(|existing| existing.submission_id == record.submission_id)
        {
            return Err(ClientError::DuplicateSubmission(record.submission_id));
        }

        let mut updated = Vec::with_capacity(records.len() + 1);
        updated.push(record.clone());
        updated.extend(records.iter().cloned());
        self.persist(&updated).await?;
        *records = updated;

        info!(
            submission_id = %record.submission_id,
            assignment_id = %record.assignment_id,
            "ledger: submission recorded"
        );
        Ok(record)
    }

    /// Applies server-reported `status`/`feedback` to the record with this id.
    pub async fn merge_status(
        &self,
        submission_id: &SubmissionId,
        status: SubmissionStatus,
        feedback: Option<Feedback>,
    ) -> Result<MergeOutcome, ClientError> {
        let mut records = self.records.lock().await;
        let index = records
            .iter()
            .position(|record| record.submission_id == *submission_id)
            .ok_or_else(|| ClientError::UnknownSubmission(submission_id.clone()))?;

        let mut record = records[index].clone();
        let reported = status.clone();
        let transition = record.merge_status(status, feedback);

        if transition == StatusTransition::Ignored {
            warn!(
                %submission_id,
                reported = %reported,
                "ledger: ignoring status that would leave evaluated"
            );
            return Ok(MergeOutcome { record, transition });
        }

        let mut updated = records.clone();
        updated[index] = record.clone();
        self.persist(&updated).await?;
        *records = updated;

        info!(
            %submission_id,
            status = %record.status,
            ?transition,
            "ledger: status merged"
        );
        Ok(MergeOutcome { record, transition })
    }

    async fn persist(&self, records: &[SubmissionRecord]) -> Result<(), ClientError> {
        let encoded = encode_ledger(records)?;
        self.store
            .set(SUBMISSIONS_KEY, &encoded)
            .await
            .map_err(|source| ClientError::persistence(SUBMISSIONS_KEY, source))
    }
}

pub fn encode_ledger(records: &[SubmissionRecord]) -> Result<String, ClientError> {
    serde_json::to_string(records).map_err(|source| ClientError::persistence(SUBMISSIONS_KEY, source))
}

/// Unreadable data is dropped in favour of an empty ledger.
pub fn decode_ledger(raw: &str) -> Vec<SubmissionRecord> {
    match serde_json::from_str::<Vec<SubmissionRecord>>(raw) {
        Ok(records) => records,
        Err(err) => {
            warn!(error = %err, "ledger: discarding unreadable stored submissions");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[path = "tests/ledger_tests.rs"]
mod tests;
