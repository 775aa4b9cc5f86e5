use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "roles, users and jobs tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS jobtrack.roles (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS jobtrack.users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS jobtrack.user_roles (
    user_id BIGINT NOT NULL REFERENCES jobtrack.users(id) ON DELETE CASCADE,
    role_id INTEGER NOT NULL REFERENCES jobtrack.roles(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, role_id)
);

CREATE TABLE IF NOT EXISTS jobtrack.jobs (
    id BIGSERIAL PRIMARY KEY,
    title TEXT,
    description TEXT,
    company TEXT,
    location TEXT,
    created_at TIMESTAMPTZ,
    external_id TEXT,
    source TEXT,
    job_url TEXT,
    apply_url TEXT,
    requirements TEXT,
    similarity_score DOUBLE PRECISION,
    keywords TEXT,
    saved_by_user_id BIGINT REFERENCES jobtrack.users(id) ON DELETE CASCADE,
    applied BOOLEAN NOT NULL DEFAULT false,
    applied_at TIMESTAMPTZ,
    saved_at TIMESTAMPTZ
);
"#,
    },
    Migration {
        id: 2,
        description: "saved job lookup indexes + per-user external id uniqueness",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_jobs_saved_by_user_saved_at
    ON jobtrack.jobs(saved_by_user_id, saved_at DESC, id DESC)
    WHERE saved_by_user_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_jobs_source
    ON jobtrack.jobs(source);

CREATE UNIQUE INDEX IF NOT EXISTS uq_jobs_external_id_saved_by_user
    ON jobtrack.jobs(external_id, saved_by_user_id)
    WHERE external_id IS NOT NULL AND saved_by_user_id IS NOT NULL;
"#,
    },
    Migration {
        id: 3,
        description: "per-user uniqueness for saved jobs without an external id",
        sql: r#"
CREATE UNIQUE INDEX IF NOT EXISTS uq_jobs_saved_without_external_id
    ON jobtrack.jobs(saved_by_user_id)
    WHERE external_id IS NULL AND saved_by_user_id IS NOT NULL;
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS jobtrack;
             CREATE TABLE IF NOT EXISTS jobtrack.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM jobtrack.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO jobtrack.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_ids_are_strictly_increasing() {
        let ids: Vec<i32> = MIGRATIONS.iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(ids.first(), Some(&1));
    }

    #[test]
    fn uniqueness_index_only_covers_saved_rows() {
        let sql = MIGRATIONS
            .iter()
            .map(|m| m.sql)
            .find(|sql| sql.contains("uq_jobs_external_id_saved_by_user"))
            .expect("uniqueness migration present");
        assert!(sql.contains("WHERE external_id IS NOT NULL AND saved_by_user_id IS NOT NULL"));
    }

    #[test]
    fn saved_rows_without_external_id_are_unique_per_user() {
        let sql = MIGRATIONS
            .iter()
            .map(|m| m.sql)
            .find(|sql| sql.contains("uq_jobs_saved_without_external_id"))
            .expect("null external id uniqueness migration present");
        assert!(sql.contains("ON jobtrack.jobs(saved_by_user_id)"));
        assert!(sql.contains("WHERE external_id IS NULL AND saved_by_user_id IS NOT NULL"));
    }
}
