use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::db::{JobStore, RoleStore, StoreError, UserStore};
use crate::models::{Job, NewJob, Role, RoleName, User};

#[derive(Debug, Default)]
struct MemoryState {
    jobs: BTreeMap<i64, Job>,
    users: BTreeMap<i64, User>,
    roles: BTreeMap<i32, Role>,
    next_job_id: i64,
    next_user_id: i64,
    next_role_id: i32,
}

impl MemoryState {
    fn duplicate_exists(&self, key: Option<(Option<&str>, i64)>) -> bool {
        let Some((external_id, user_id)) = key else {
            return false;
        };
        self.jobs.values().any(|existing| {
            existing.external_id.as_deref() == external_id
                && existing.saved_by_user_id == Some(user_id)
        })
    }
}

/// Newest first by the given timestamp, rows without one last, id as tiebreak.
fn newest_first(a: &Job, b: &Job, key: fn(&Job) -> Option<DateTime<Utc>>) -> Ordering {
    match (key(a), key(b)) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(b.id.cmp(&a.id))
}

/// Process-local store with the same ordering and uniqueness rules as the
/// postgres schema. Used for `--storage memory` and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    /// Register a user. Registration is not part of the HTTP surface, so
    /// users are provisioned directly against the store.
    pub async fn add_user(&self, username: &str, roles: &[RoleName]) -> User {
        let mut state = self.state.write().await;
        if let Some(existing) = state.users.values().find(|u| u.username == username) {
            return existing.clone();
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            username: username.to_string(),
            roles: roles.iter().copied().collect::<BTreeSet<_>>(),
        };
        state.users.insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<Job>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().await.jobs.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Job>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn find_saved_by_external_id(
        &self,
        external_id: Option<&str>,
        user_id: i64,
    ) -> Result<Option<Job>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .find(|job| job.external_id.as_deref() == external_id && job.is_owned_by(user_id))
            .cloned())
    }

    async fn find_saved_by_user(&self, user_id: i64) -> Result<Vec<Job>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.is_owned_by(user_id))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| newest_first(a, b, |job| job.saved_date));
        Ok(jobs)
    }

    async fn find_applied_by_user(&self, user_id: i64) -> Result<Vec<Job>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.is_owned_by(user_id) && job.applied)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| newest_first(a, b, |job| job.applied_date));
        Ok(jobs)
    }

    async fn find_by_source(&self, source: &str) -> Result<Vec<Job>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.source.as_deref() == Some(source))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self.state.read().await.jobs.len() as u64)
    }

    async fn insert(&self, job: &NewJob) -> Result<Job, StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.duplicate_exists(job.dedup_key()) {
            return Err(StoreError::DuplicateSavedJob {
                external_id: job.external_id.clone(),
                user_id: job.saved_by_user_id.unwrap_or_default(),
            });
        }
        state.next_job_id += 1;
        let stored = Job::from_new(state.next_job_id, job.clone());
        state.jobs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn mark_applied(
        &self,
        id: i64,
        applied_at: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        Ok(state.jobs.get_mut(&id).map(|job| {
            job.applied = true;
            job.applied_date = Some(applied_at);
            job.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.state.write().await.jobs.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        Ok(self.state.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn find_by_name(&self, name: RoleName) -> Result<Option<Role>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.roles.values().find(|role| role.name == name).cloned())
    }

    async fn insert(&self, name: RoleName) -> Result<Role, StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if let Some(existing) = state.roles.values().find(|role| role.name == name) {
            return Ok(existing.clone());
        }
        state.next_role_id += 1;
        let role = Role {
            id: state.next_role_id,
            name,
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn saved(external_id: &str, user_id: i64, minutes: i64) -> NewJob {
        NewJob {
            external_id: Some(external_id.into()),
            saved_by_user_id: Some(user_id),
            saved_date: Some(base() + Duration::minutes(minutes)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_rejects_same_external_id_for_same_owner() {
        let store = MemoryStore::new();
        JobStore::insert(&store, &saved("ext-1", 1, 0)).await.unwrap();

        let err = JobStore::insert(&store, &saved("ext-1", 1, 5)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSavedJob { user_id: 1, .. }));

        JobStore::insert(&store, &saved("ext-1", 2, 5)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn saved_rows_without_external_id_conflict_per_owner() {
        let store = MemoryStore::new();
        let untagged = |user_id| NewJob {
            saved_by_user_id: Some(user_id),
            ..Default::default()
        };
        let first = JobStore::insert(&store, &untagged(1)).await.unwrap();

        let err = JobStore::insert(&store, &untagged(1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateSavedJob { external_id: None, user_id: 1 }
        ));
        JobStore::insert(&store, &untagged(2)).await.unwrap();

        let found = store.find_saved_by_external_id(None, 1).await.unwrap();
        assert_eq!(found.map(|job| job.id), Some(first.id));
        assert!(store.find_saved_by_external_id(None, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn catalog_rows_never_conflict() {
        let store = MemoryStore::new();
        let catalog = NewJob {
            external_id: Some("ext-1".into()),
            ..Default::default()
        };
        JobStore::insert(&store, &catalog).await.unwrap();
        JobStore::insert(&store, &catalog).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn saved_jobs_come_back_newest_first() {
        let store = MemoryStore::new();
        JobStore::insert(&store, &saved("a", 1, 10)).await.unwrap();
        JobStore::insert(&store, &saved("b", 1, 30)).await.unwrap();
        JobStore::insert(&store, &saved("c", 1, 20)).await.unwrap();
        JobStore::insert(&store, &saved("d", 2, 40)).await.unwrap();

        let ids: Vec<String> = store
            .find_saved_by_user(1)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|job| job.external_id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn mark_applied_updates_in_place_but_never_recreates() {
        let store = MemoryStore::new();
        let job = JobStore::insert(&store, &saved("a", 1, 0)).await.unwrap();
        let at = base() + Duration::hours(1);

        let marked = store.mark_applied(job.id, at).await.unwrap().unwrap();
        assert!(marked.applied);
        assert_eq!(marked.applied_date, Some(at));
        let applied = store.find_applied_by_user(1).await.unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].id, job.id);

        assert!(store.delete(job.id).await.unwrap());
        assert!(!store.delete(job.id).await.unwrap());
        assert!(store.mark_applied(job.id, at).await.unwrap().is_none());
        assert!(JobStore::find_by_id(&store, job.id).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.find_all().await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));

        store.set_unavailable(false);
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn role_insert_is_idempotent() {
        let store = MemoryStore::new();
        let first = RoleStore::insert(&store, RoleName::User).await.unwrap();
        let second = RoleStore::insert(&store, RoleName::User).await.unwrap();
        assert_eq!(first, second);
        assert!(store.find_by_name(RoleName::Admin).await.unwrap().is_none());
    }
}
