use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::NewJob;

/// Similarity score as scrapers send it: sometimes a number, sometimes text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SimilarityScore {
    Number(f64),
    Text(String),
    Other(Value),
}

impl SimilarityScore {
    /// Numbers pass through, text is parsed and falls back to 0.0, anything
    /// else carries no score.
    pub fn coerce(&self) -> Option<f64> {
        match self {
            SimilarityScore::Number(value) => Some(*value),
            SimilarityScore::Text(raw) => Some(raw.trim().parse::<f64>().unwrap_or(0.0)),
            SimilarityScore::Other(_) => None,
        }
    }
}

/// Body of `POST /api/jobs/save`. Every field is optional; `id` carries the
/// scraper's external id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveJobRequest {
    #[serde(default, rename = "id", alias = "external_id", alias = "externalId")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "jobUrl")]
    pub job_url: Option<String>,
    #[serde(default, alias = "applyUrl")]
    pub apply_url: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default, alias = "similarityScore")]
    pub similarity_score: Option<SimilarityScore>,
}

impl SaveJobRequest {
    /// Build the row to persist as `owner_id`'s saved copy.
    pub fn into_new_job(self, owner_id: i64, now: DateTime<Utc>) -> NewJob {
        NewJob {
            similarity_score: self.similarity_score.as_ref().and_then(SimilarityScore::coerce),
            title: self.title,
            description: self.description,
            company: self.company,
            location: self.location,
            timestamp: Some(now),
            external_id: self.external_id,
            source: self.source,
            job_url: self.job_url,
            apply_url: self.apply_url,
            requirements: self.requirements,
            keywords: self.keywords,
            saved_by_user_id: Some(owner_id),
            applied: false,
            applied_date: None,
            saved_date: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn score_of(value: Value) -> Option<f64> {
        let request: SaveJobRequest =
            serde_json::from_value(json!({ "id": "x", "similarity_score": value })).unwrap();
        request.similarity_score.and_then(|score| score.coerce())
    }

    #[test]
    fn numeric_text_is_parsed() {
        assert_eq!(score_of(json!("0.85")), Some(0.85));
        assert_eq!(score_of(json!(" 0.5 ")), Some(0.5));
    }

    #[test]
    fn unparsable_text_falls_back_to_zero() {
        assert_eq!(score_of(json!("not-a-number")), Some(0.0));
        assert_eq!(score_of(json!("")), Some(0.0));
    }

    #[test]
    fn native_numbers_pass_through() {
        assert_eq!(score_of(json!(0.85)), Some(0.85));
        assert_eq!(score_of(json!(1)), Some(1.0));
    }

    #[test]
    fn other_kinds_carry_no_score() {
        assert_eq!(score_of(json!(true)), None);
        assert_eq!(score_of(json!(null)), None);
        assert_eq!(score_of(json!({ "value": 1 })), None);
    }

    #[test]
    fn payload_uses_scraper_keys() {
        let request: SaveJobRequest = serde_json::from_value(json!({
            "id": "linkedin_2",
            "title": "Rust Engineer",
            "company": "Ferrous",
            "job_url": "https://jobs.example/2",
            "apply_url": "https://jobs.example/2/apply",
            "unknown": "ignored"
        }))
        .unwrap();

        assert_eq!(request.external_id.as_deref(), Some("linkedin_2"));
        assert_eq!(request.job_url.as_deref(), Some("https://jobs.example/2"));
        assert_eq!(request.apply_url.as_deref(), Some("https://jobs.example/2/apply"));
        assert!(request.description.is_none());
    }

    #[test]
    fn new_job_is_owned_and_stamped() {
        let now = Utc::now();
        let request = SaveJobRequest {
            external_id: Some("bdjobs_1".into()),
            similarity_score: Some(SimilarityScore::Text("0.4".into())),
            ..Default::default()
        };

        let job = request.into_new_job(9, now);
        assert_eq!(job.saved_by_user_id, Some(9));
        assert_eq!(job.saved_date, Some(now));
        assert_eq!(job.timestamp, Some(now));
        assert_eq!(job.similarity_score, Some(0.4));
        assert!(!job.applied);
    }
}
