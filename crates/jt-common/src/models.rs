use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Permission tag attached to users and to authenticated principals.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
pub enum RoleName {
    #[serde(rename = "ROLE_USER")]
    #[strum(serialize = "ROLE_USER")]
    User,
    #[serde(rename = "ROLE_ADMIN")]
    #[strum(serialize = "ROLE_ADMIN")]
    Admin,
}

impl RoleName {
    pub const ALL: [RoleName; 2] = [RoleName::User, RoleName::Admin];

    /// Parse a role as it appears in a token claim. The `ROLE_` prefix and
    /// letter case are both optional.
    pub fn from_claim(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let bare = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("ROLE_"))
            .map(|_| &trimmed[5..])
            .unwrap_or(trimmed);

        if bare.eq_ignore_ascii_case("USER") {
            Some(RoleName::User)
        } else if bare.eq_ignore_ascii_case("ADMIN") {
            Some(RoleName::Admin)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i32,
    pub name: RoleName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub roles: BTreeSet<RoleName>,
}

/// A job posting. Rows without an owner are catalog jobs; rows with an owner
/// are that user's saved copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub source: Option<String>,
    pub job_url: Option<String>,
    pub apply_url: Option<String>,
    pub requirements: Option<String>,
    pub similarity_score: Option<f64>,
    pub keywords: Option<String>,
    pub saved_by_user_id: Option<i64>,
    pub applied: bool,
    pub applied_date: Option<DateTime<Utc>>,
    pub saved_date: Option<DateTime<Utc>>,
}

impl Job {
    pub fn from_new(id: i64, job: NewJob) -> Self {
        Self {
            id,
            title: job.title,
            description: job.description,
            company: job.company,
            location: job.location,
            timestamp: job.timestamp,
            external_id: job.external_id,
            source: job.source,
            job_url: job.job_url,
            apply_url: job.apply_url,
            requirements: job.requirements,
            similarity_score: job.similarity_score,
            keywords: job.keywords,
            saved_by_user_id: job.saved_by_user_id,
            applied: job.applied,
            applied_date: job.applied_date,
            saved_date: job.saved_date,
        }
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.saved_by_user_id == Some(user_id)
    }
}

/// Job row before the store has assigned an id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewJob {
    pub title: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub source: Option<String>,
    pub job_url: Option<String>,
    pub apply_url: Option<String>,
    pub requirements: Option<String>,
    pub similarity_score: Option<f64>,
    pub keywords: Option<String>,
    pub saved_by_user_id: Option<i64>,
    pub applied: bool,
    pub applied_date: Option<DateTime<Utc>>,
    pub saved_date: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn catalog(
        title: &str,
        company: &str,
        location: &str,
        description: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: Some(title.to_string()),
            company: Some(company.to_string()),
            location: Some(location.to_string()),
            description: Some(description.to_string()),
            timestamp: Some(created_at),
            ..Default::default()
        }
    }

    /// External id (possibly absent) and owner. Every saved row takes part
    /// in dedup; catalog rows never do.
    pub fn dedup_key(&self) -> Option<(Option<&str>, i64)> {
        self.saved_by_user_id
            .map(|user_id| (self.external_id.as_deref(), user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_claims_accept_prefixed_and_bare_names() {
        assert_eq!(RoleName::from_claim("ROLE_USER"), Some(RoleName::User));
        assert_eq!(RoleName::from_claim("admin"), Some(RoleName::Admin));
        assert_eq!(RoleName::from_claim(" role_admin "), Some(RoleName::Admin));
        assert_eq!(RoleName::from_claim("ROLE_GUEST"), None);
        assert_eq!(RoleName::from_claim(""), None);
    }

    #[test]
    fn role_names_round_trip_through_storage_form() {
        for role in RoleName::ALL {
            assert_eq!(RoleName::from_str(role.as_ref()).unwrap(), role);
            assert_eq!(role.to_string(), role.as_ref());
        }
    }

    #[test]
    fn job_serializes_with_camel_case_keys() {
        let job = Job::from_new(
            7,
            NewJob {
                external_id: Some("bdjobs_1".into()),
                apply_url: Some("https://example.com/apply".into()),
                saved_by_user_id: Some(3),
                ..Default::default()
            },
        );

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["externalId"], "bdjobs_1");
        assert_eq!(value["applyUrl"], "https://example.com/apply");
        assert_eq!(value["savedByUserId"], 3);
        assert_eq!(value["applied"], false);
    }

    #[test]
    fn dedup_key_requires_owner_but_not_external_id() {
        let mut job = NewJob {
            external_id: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(job.dedup_key(), None);

        job.saved_by_user_id = Some(1);
        assert_eq!(job.dedup_key(), Some((Some("x"), 1)));

        job.external_id = None;
        assert_eq!(job.dedup_key(), Some((None, 1)));
    }
}
