use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::util::TimedClientExt;
use crate::db::{JobStore, PgStore, StoreError};
use crate::models::{Job, NewJob};

const JOB_COLUMNS: &str = "id, title, description, company, location, created_at, external_id, \
     source, job_url, apply_url, requirements, similarity_score, keywords, saved_by_user_id, \
     applied, applied_at, saved_at";

fn row_to_job(row: &Row) -> Result<Job, StoreError> {
    Ok(Job {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        company: row.try_get("company")?,
        location: row.try_get("location")?,
        timestamp: row.try_get("created_at")?,
        external_id: row.try_get("external_id")?,
        source: row.try_get("source")?,
        job_url: row.try_get("job_url")?,
        apply_url: row.try_get("apply_url")?,
        requirements: row.try_get("requirements")?,
        similarity_score: row.try_get("similarity_score")?,
        keywords: row.try_get("keywords")?,
        saved_by_user_id: row.try_get("saved_by_user_id")?,
        applied: row.try_get("applied")?,
        applied_date: row.try_get("applied_at")?,
        saved_date: row.try_get("saved_at")?,
    })
}

fn rows_to_jobs(rows: &[Row]) -> Result<Vec<Job>, StoreError> {
    rows.iter().map(row_to_job).collect()
}

fn duplicate_of(external_id: Option<&str>, user_id: Option<i64>) -> StoreError {
    StoreError::DuplicateSavedJob {
        external_id: external_id.map(str::to_string),
        user_id: user_id.unwrap_or_default(),
    }
}

#[async_trait]
impl JobStore for PgStore {
    #[instrument(skip(self))]
    async fn find_all(&self) -> Result<Vec<Job>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .timed_query_cached(
                &format!("SELECT {JOB_COLUMNS} FROM jobtrack.jobs ORDER BY id"),
                &[],
                "jobs_find_all",
            )
            .await?;
        rows_to_jobs(&rows)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<Job>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .timed_query_opt_cached(
                &format!("SELECT {JOB_COLUMNS} FROM jobtrack.jobs WHERE id = $1"),
                &[&id],
                "jobs_find_by_id",
            )
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    #[instrument(skip(self))]
    async fn find_saved_by_external_id(
        &self,
        external_id: Option<&str>,
        user_id: i64,
    ) -> Result<Option<Job>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .timed_query_opt_cached(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobtrack.jobs
                     WHERE external_id IS NOT DISTINCT FROM $1 AND saved_by_user_id = $2
                     ORDER BY id
                     LIMIT 1"
                ),
                &[&external_id, &user_id],
                "jobs_find_saved_by_external_id",
            )
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    #[instrument(skip(self))]
    async fn find_saved_by_user(&self, user_id: i64) -> Result<Vec<Job>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .timed_query_cached(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobtrack.jobs
                     WHERE saved_by_user_id = $1
                     ORDER BY saved_at DESC NULLS LAST, id DESC"
                ),
                &[&user_id],
                "jobs_find_saved_by_user",
            )
            .await?;
        rows_to_jobs(&rows)
    }

    #[instrument(skip(self))]
    async fn find_applied_by_user(&self, user_id: i64) -> Result<Vec<Job>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .timed_query_cached(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobtrack.jobs
                     WHERE saved_by_user_id = $1 AND applied = true
                     ORDER BY applied_at DESC NULLS LAST, id DESC"
                ),
                &[&user_id],
                "jobs_find_applied_by_user",
            )
            .await?;
        rows_to_jobs(&rows)
    }

    #[instrument(skip(self))]
    async fn find_by_source(&self, source: &str) -> Result<Vec<Job>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .timed_query_cached(
                &format!("SELECT {JOB_COLUMNS} FROM jobtrack.jobs WHERE source = $1 ORDER BY id"),
                &[&source],
                "jobs_find_by_source",
            )
            .await?;
        rows_to_jobs(&rows)
    }

    #[instrument(skip(self))]
    async fn count(&self) -> Result<u64, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .timed_query_one_cached("SELECT COUNT(*) FROM jobtrack.jobs", &[], "jobs_count")
            .await?;
        let count: i64 = row.try_get(0)?;
        u64::try_from(count).map_err(|e| StoreError::Mapping(e.to_string()))
    }

    #[instrument(skip(self, job))]
    async fn insert(&self, job: &NewJob) -> Result<Job, StoreError> {
        let client = self.pool.get().await?;

        // DO NOTHING only fires on the two partial saved-row indexes; an empty
        // RETURNING means the owner already has a row with this external id.
        let row = client
            .timed_query_opt_cached(
                &format!(
                    "INSERT INTO jobtrack.jobs (
                        title,
                        description,
                        company,
                        location,
                        created_at,
                        external_id,
                        source,
                        job_url,
                        apply_url,
                        requirements,
                        similarity_score,
                        keywords,
                        saved_by_user_id,
                        applied,
                        applied_at,
                        saved_at
                    ) VALUES (
                        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                        $11, $12, $13, $14, $15, $16
                    )
                    ON CONFLICT DO NOTHING
                    RETURNING {JOB_COLUMNS}"
                ),
                &[
                    &job.title,
                    &job.description,
                    &job.company,
                    &job.location,
                    &job.timestamp,
                    &job.external_id,
                    &job.source,
                    &job.job_url,
                    &job.apply_url,
                    &job.requirements,
                    &job.similarity_score,
                    &job.keywords,
                    &job.saved_by_user_id,
                    &job.applied,
                    &job.applied_date,
                    &job.saved_date,
                ],
                "jobs_insert",
            )
            .await?;

        match row {
            Some(row) => row_to_job(&row),
            None => Err(duplicate_of(job.external_id.as_deref(), job.saved_by_user_id)),
        }
    }

    #[instrument(skip(self))]
    async fn mark_applied(
        &self,
        id: i64,
        applied_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .timed_query_opt_cached(
                &format!(
                    "UPDATE jobtrack.jobs
                     SET applied = true, applied_at = $2
                     WHERE id = $1
                     RETURNING {JOB_COLUMNS}"
                ),
                &[&id, &applied_at],
                "jobs_mark_applied",
            )
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let removed = client
            .timed_execute_cached("DELETE FROM jobtrack.jobs WHERE id = $1", &[&id], "jobs_delete")
            .await?;
        Ok(removed == 1)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_error_names_the_conflicting_pair() {
        let err = duplicate_of(Some("bdjobs_1"), Some(4));
        assert!(matches!(
            &err,
            StoreError::DuplicateSavedJob { external_id: Some(external_id), user_id }
                if external_id == "bdjobs_1" && *user_id == 4
        ));
        assert!(err.to_string().contains("bdjobs_1"));

        let err = duplicate_of(None, Some(4));
        assert!(matches!(
            err,
            StoreError::DuplicateSavedJob { external_id: None, user_id: 4 }
        ));
    }

    #[test]
    fn job_columns_cover_every_mapped_field() {
        for column in [
            "id",
            "created_at",
            "external_id",
            "saved_by_user_id",
            "applied_at",
            "saved_at",
            "similarity_score",
        ] {
            assert!(JOB_COLUMNS.contains(column), "missing column {column}");
        }
    }
}
