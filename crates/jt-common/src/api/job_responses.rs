use serde::Serialize;

use crate::workflow::{AppliedOutcome, SaveOutcome};

pub const JOB_SAVED: &str = "Job saved successfully";
pub const JOB_ALREADY_SAVED: &str = "Job already saved";
pub const JOB_MARKED_APPLIED: &str = "Job marked as applied";
pub const JOB_REMOVED: &str = "Job removed from saved list";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SaveJobResponse {
    Saved {
        message: String,
        #[serde(rename = "jobId")]
        job_id: i64,
        #[serde(rename = "externalId")]
        external_id: Option<String>,
    },
    AlreadySaved {
        message: String,
        #[serde(rename = "jobId")]
        job_id: i64,
    },
}

impl From<SaveOutcome> for SaveJobResponse {
    fn from(outcome: SaveOutcome) -> Self {
        match outcome {
            SaveOutcome::Saved {
                job_id,
                external_id,
            } => SaveJobResponse::Saved {
                message: JOB_SAVED.to_string(),
                job_id,
                external_id,
            },
            SaveOutcome::AlreadySaved { job_id } => SaveJobResponse::AlreadySaved {
                message: JOB_ALREADY_SAVED.to_string(),
                job_id,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResponse {
    pub message: String,
    pub apply_url: Option<String>,
}

impl From<AppliedOutcome> for AppliedResponse {
    fn from(outcome: AppliedOutcome) -> Self {
        Self {
            message: JOB_MARKED_APPLIED.to_string(),
            apply_url: outcome.apply_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn saved_response_carries_external_id() {
        let response = SaveJobResponse::from(SaveOutcome::Saved {
            job_id: 4,
            external_id: Some("bdjobs_1".into()),
        });
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({ "message": "Job saved successfully", "jobId": 4, "externalId": "bdjobs_1" })
        );
    }

    #[test]
    fn already_saved_response_omits_external_id() {
        let response = SaveJobResponse::from(SaveOutcome::AlreadySaved { job_id: 4 });
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({ "message": "Job already saved", "jobId": 4 })
        );
    }

    #[test]
    fn applied_response_uses_camel_case() {
        let response = AppliedResponse::from(AppliedOutcome {
            job_id: 1,
            apply_url: Some("https://jobs.example/apply".into()),
        });
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({ "message": "Job marked as applied", "applyUrl": "https://jobs.example/apply" })
        );
    }
}
