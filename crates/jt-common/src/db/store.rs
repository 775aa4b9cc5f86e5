use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{MemoryStore, PgPool, PgStore};
use crate::models::{Job, NewJob, Role, RoleName, User};

db_error!(StoreError {
    #[error("saved job already exists for external id {external_id:?} and user {user_id}")]
    DuplicateSavedJob {
        external_id: Option<String>,
        user_id: i64,
    },
    #[error("failed to map row: {0}")]
    Mapping(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
});

/// Keyed access to job rows. Lookups report absence as `None` or an empty
/// list, never as an error.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Job>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Job>, StoreError>;

    /// The row `user_id` saved under `external_id`. `None` matches a saved
    /// row that has no external id.
    async fn find_saved_by_external_id(
        &self,
        external_id: Option<&str>,
        user_id: i64,
    ) -> Result<Option<Job>, StoreError>;

    /// Jobs owned by `user_id`, most recently saved first.
    async fn find_saved_by_user(&self, user_id: i64) -> Result<Vec<Job>, StoreError>;

    /// Applied jobs owned by `user_id`, most recently applied first.
    async fn find_applied_by_user(&self, user_id: i64) -> Result<Vec<Job>, StoreError>;

    async fn find_by_source(&self, source: &str) -> Result<Vec<Job>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Insert a new row. Fails with `DuplicateSavedJob` when another row
    /// already holds the same external id for the same owner.
    async fn insert(&self, job: &NewJob) -> Result<Job, StoreError>;

    /// Flag an existing row as applied at `applied_at`. Returns `None` when
    /// the row no longer exists; never recreates it.
    async fn mark_applied(
        &self,
        id: i64,
        applied_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_name(&self, name: RoleName) -> Result<Option<Role>, StoreError>;

    async fn insert(&self, name: RoleName) -> Result<Role, StoreError>;
}

/// The store handles a running service is wired with.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            jobs: store.clone(),
            users: store.clone(),
            roles: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            jobs: store.clone(),
            users: store.clone(),
            roles: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
