use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Wire form of an opaque identifier. Servers may hand out numeric ids; they
/// are kept as their decimal string.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Integer(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(value) => value,
            RawId::Integer(value) => value.to_string(),
        }
    }
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "RawId", into = "String")]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<RawId> for $name {
            fn from(raw: RawId) -> Self {
                Self(raw.into_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(AssignmentId);
id_newtype!(SubmissionId);

/// Display name the student works under. Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
}

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: AssignmentId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Grading status as reported by the server. Unknown values are carried
/// through untouched so a newer server cannot break the local ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmissionStatus {
    Pending,
    Evaluated,
    Other(String),
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Evaluated => "evaluated",
            SubmissionStatus::Other(value) => value,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self, SubmissionStatus::Evaluated)
    }
}

impl From<String> for SubmissionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => SubmissionStatus::Pending,
            "evaluated" => SubmissionStatus::Evaluated,
            _ => SubmissionStatus::Other(value),
        }
    }
}

impl From<SubmissionStatus> for String {
    fn from(status: SubmissionStatus) -> Self {
        match status {
            SubmissionStatus::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// 0 to 100.
    pub score: u8,
    pub plagiarism_risk: String,
    pub feedback_summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub assignment_title: String,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

/// What a status merge did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Same status as before. Feedback may still have been replaced.
    Unchanged,
    /// Moved to another non-terminal status.
    Advanced,
    /// Entered `evaluated` for the first time.
    Evaluated,
    /// The update would have left `evaluated`; the record was not touched.
    Ignored,
}

impl SubmissionRecord {
    pub fn pending(
        submission_id: SubmissionId,
        assignment: &Assignment,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            submission_id,
            assignment_id: assignment.assignment_id.clone(),
            assignment_title: assignment.title.clone(),
            submitted_at,
            status: SubmissionStatus::Pending,
            feedback: None,
        }
    }

    /// Overwrites `status` and `feedback` with server state, leaving every
    /// other field alone. `evaluated` is terminal, and only `evaluated`
    /// carries feedback.
    pub fn merge_status(
        &mut self,
        status: SubmissionStatus,
        feedback: Option<Feedback>,
    ) -> StatusTransition {
        if self.status.is_evaluated() && !status.is_evaluated() {
            return StatusTransition::Ignored;
        }

        let was_evaluated = self.status.is_evaluated();
        let changed = self.status != status;
        self.feedback = if status.is_evaluated() { feedback } else { None };
        self.status = status;

        if !was_evaluated && self.status.is_evaluated() {
            StatusTransition::Evaluated
        } else if changed {
            StatusTransition::Advanced
        } else {
            StatusTransition::Unchanged
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
