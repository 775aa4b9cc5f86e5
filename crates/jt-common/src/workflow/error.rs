use std::fmt;

use thiserror::Error;

use crate::db::StoreError;

/// Workflow step named in "Failed to ..." messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    SaveJob,
    ListSavedJobs,
    ListAppliedJobs,
    MarkApplied,
    DeleteJob,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::SaveJob => "save job",
            WorkflowAction::ListSavedJobs => "load saved jobs",
            WorkflowAction::ListAppliedJobs => "load applied jobs",
            WorkflowAction::MarkApplied => "mark as applied",
            WorkflowAction::DeleteJob => "delete job",
        }
    }

    pub fn storage(self, source: StoreError) -> WorkflowError {
        WorkflowError::Storage {
            action: self,
            source,
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of saved-job operations. Every variant is a client-facing
/// outcome; display strings are the messages returned to callers.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("User not found")]
    UserNotFound { username: String },
    #[error("User or job not found")]
    NotFound { job_id: i64 },
    #[error("Unauthorized")]
    Unauthorized { job_id: i64, user_id: i64 },
    #[error("Failed to {action}: {source}")]
    Storage {
        action: WorkflowAction,
        #[source]
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_name_the_failed_action() {
        let err = WorkflowAction::SaveJob.storage(StoreError::Unavailable("db down".into()));
        assert_eq!(err.to_string(), "Failed to save job: storage unavailable: db down");
    }

    #[test]
    fn ownership_violation_reads_unauthorized() {
        let err = WorkflowError::Unauthorized {
            job_id: 1,
            user_id: 2,
        };
        assert_eq!(err.to_string(), "Unauthorized");
    }
}
