use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::{StoreError, Stores};
use crate::models::{NewJob, RoleName};

/// What a bootstrap pass actually created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub roles_created: Vec<RoleName>,
    pub sample_jobs_created: usize,
}

const SAMPLE_JOBS: [(&str, &str, &str, &str); 3] = [
    (
        "Java Developer",
        "Tech Corp",
        "New York, NY",
        "We are looking for an experienced Java developer to join our team. You will be \
         responsible for developing and maintaining our enterprise applications using Spring \
         Boot, Hibernate, and other modern Java technologies.",
    ),
    (
        "Frontend React Developer",
        "StartupXYZ",
        "San Francisco, CA",
        "Join our dynamic team as a Frontend Developer. You'll work with React, TypeScript, and \
         modern CSS frameworks to create beautiful and responsive user interfaces for our web \
         applications.",
    ),
    (
        "Full Stack Engineer",
        "Innovation Labs",
        "Austin, TX",
        "We're seeking a talented Full Stack Engineer to work on both frontend and backend \
         systems. Experience with Node.js, React, PostgreSQL, and cloud platforms is preferred.",
    ),
];

/// Insert whichever of the known roles are missing.
pub async fn seed_roles(stores: &Stores) -> Result<Vec<RoleName>, StoreError> {
    let mut created = Vec::new();
    for name in RoleName::ALL {
        if stores.roles.find_by_name(name).await?.is_none() {
            stores.roles.insert(name).await?;
            info!(role = %name, "created role");
            created.push(name);
        }
    }
    Ok(created)
}

/// Roles, plus the sample catalog when the job table is empty. Safe to run
/// on every start.
pub async fn seed_defaults(stores: &Stores, now: DateTime<Utc>) -> Result<SeedReport, StoreError> {
    let roles_created = seed_roles(stores).await?;

    let mut sample_jobs_created = 0;
    if stores.jobs.count().await? == 0 {
        for (title, company, location, description) in SAMPLE_JOBS {
            stores
                .jobs
                .insert(&NewJob::catalog(title, company, location, description, now))
                .await?;
            sample_jobs_created += 1;
        }
        info!(count = sample_jobs_created, "created sample jobs");
    }

    Ok(SeedReport {
        roles_created,
        sample_jobs_created,
    })
}
