use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::api::SaveJobRequest;
use crate::db::{JobStore, StoreError, Stores};
use crate::identity::{IdentityError, IdentityResolver, Principal};
use crate::models::{Job, User};
use crate::workflow::{Clock, SystemClock, WorkflowAction, WorkflowError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved {
        job_id: i64,
        external_id: Option<String>,
    },
    AlreadySaved {
        job_id: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOutcome {
    pub job_id: i64,
    pub apply_url: Option<String>,
}

/// Catalog reads plus the per-user saved-job operations.
#[derive(Clone)]
pub struct SavedJobWorkflow {
    jobs: Arc<dyn JobStore>,
    identity: IdentityResolver,
    clock: Arc<dyn Clock>,
}

impl SavedJobWorkflow {
    pub fn new(jobs: Arc<dyn JobStore>, identity: IdentityResolver, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs,
            identity,
            clock,
        }
    }

    pub fn from_stores(stores: &Stores) -> Self {
        Self::new(
            stores.jobs.clone(),
            IdentityResolver::new(stores.users.clone()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn list_catalog(&self) -> Result<Vec<Job>, StoreError> {
        self.jobs.find_all().await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Job>, StoreError> {
        self.jobs.find_by_id(id).await
    }

    pub async fn list_by_source(&self, source: &str) -> Result<Vec<Job>, StoreError> {
        self.jobs.find_by_source(source).await
    }

    async fn resolve_user(
        &self,
        principal: &Principal,
        action: WorkflowAction,
    ) -> Result<User, WorkflowError> {
        self.identity
            .resolve(principal)
            .await
            .map_err(|err| match err {
                IdentityError::UserNotFound(username) => WorkflowError::UserNotFound { username },
                IdentityError::Storage(source) => action.storage(source),
            })
    }

    /// Resolve both the caller and the target job; either missing is `NotFound`.
    async fn resolve_user_and_job(
        &self,
        principal: &Principal,
        job_id: i64,
        action: WorkflowAction,
    ) -> Result<(User, Job), WorkflowError> {
        let user = match self.resolve_user(principal, action).await {
            Ok(user) => Some(user),
            Err(WorkflowError::UserNotFound { .. }) => None,
            Err(other) => return Err(other),
        };
        let job = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(|err| action.storage(err))?;

        match (user, job) {
            (Some(user), Some(job)) => Ok((user, job)),
            _ => Err(WorkflowError::NotFound { job_id }),
        }
    }

    #[instrument(skip(self, principal, request), fields(username = %principal.username))]
    pub async fn save(
        &self,
        principal: &Principal,
        request: SaveJobRequest,
    ) -> Result<SaveOutcome, WorkflowError> {
        let action = WorkflowAction::SaveJob;
        let user = self.resolve_user(principal, action).await?;

        let existing = self
            .jobs
            .find_saved_by_external_id(request.external_id.as_deref(), user.id)
            .await
            .map_err(|err| action.storage(err))?;
        if let Some(job) = existing {
            debug!(job_id = job.id, external_id = ?request.external_id, "job already saved");
            return Ok(SaveOutcome::AlreadySaved { job_id: job.id });
        }

        let new_job = request.into_new_job(user.id, self.clock.now());
        match self.jobs.insert(&new_job).await {
            Ok(job) => {
                info!(job_id = job.id, external_id = ?job.external_id, "job saved");
                Ok(SaveOutcome::Saved {
                    job_id: job.id,
                    external_id: job.external_id,
                })
            }
            Err(StoreError::DuplicateSavedJob {
                external_id,
                user_id,
            }) => {
                // A concurrent save for the same pair won between our lookup
                // and the insert; report the row that won.
                warn!(?external_id, user_id, "concurrent save detected");
                match self
                    .jobs
                    .find_saved_by_external_id(external_id.as_deref(), user_id)
                    .await
                    .map_err(|err| action.storage(err))?
                {
                    Some(job) => Ok(SaveOutcome::AlreadySaved { job_id: job.id }),
                    None => Err(action.storage(StoreError::DuplicateSavedJob {
                        external_id,
                        user_id,
                    })),
                }
            }
            Err(err) => Err(action.storage(err)),
        }
    }

    #[instrument(skip(self, principal), fields(username = %principal.username))]
    pub async fn list_saved(&self, principal: &Principal) -> Result<Vec<Job>, WorkflowError> {
        let action = WorkflowAction::ListSavedJobs;
        let user = self.resolve_user(principal, action).await?;
        self.jobs
            .find_saved_by_user(user.id)
            .await
            .map_err(|err| action.storage(err))
    }

    #[instrument(skip(self, principal), fields(username = %principal.username))]
    pub async fn list_applied(&self, principal: &Principal) -> Result<Vec<Job>, WorkflowError> {
        let action = WorkflowAction::ListAppliedJobs;
        let user = self.resolve_user(principal, action).await?;
        self.jobs
            .find_applied_by_user(user.id)
            .await
            .map_err(|err| action.storage(err))
    }

    /// Any authenticated user may mark any job applied; there is no
    /// ownership check here, unlike `delete_saved`.
    #[instrument(skip(self, principal), fields(username = %principal.username))]
    pub async fn mark_applied(
        &self,
        principal: &Principal,
        job_id: i64,
    ) -> Result<AppliedOutcome, WorkflowError> {
        let action = WorkflowAction::MarkApplied;
        let (user, job) = self.resolve_user_and_job(principal, job_id, action).await?;

        if !job.is_owned_by(user.id) {
            debug!(job_id, user_id = user.id, owner = ?job.saved_by_user_id, "marking a job the caller does not own");
        }

        // A delete may land between the lookup and the update.
        let job = self
            .jobs
            .mark_applied(job_id, self.clock.now())
            .await
            .map_err(|err| action.storage(err))?
            .ok_or(WorkflowError::NotFound { job_id })?;

        info!(job_id, "job marked as applied");
        Ok(AppliedOutcome {
            job_id: job.id,
            apply_url: job.apply_url,
        })
    }

    #[instrument(skip(self, principal), fields(username = %principal.username))]
    pub async fn delete_saved(&self, principal: &Principal, job_id: i64) -> Result<(), WorkflowError> {
        let action = WorkflowAction::DeleteJob;
        let (user, job) = self.resolve_user_and_job(principal, job_id, action).await?;

        if !job.is_owned_by(user.id) {
            warn!(job_id, user_id = user.id, owner = ?job.saved_by_user_id, "delete rejected: caller does not own job");
            return Err(WorkflowError::Unauthorized {
                job_id,
                user_id: user.id,
            });
        }

        let removed = self
            .jobs
            .delete(job_id)
            .await
            .map_err(|err| action.storage(err))?;
        if !removed {
            return Err(WorkflowError::NotFound { job_id });
        }

        info!(job_id, "saved job removed");
        Ok(())
    }
}
