use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::db::{StoreError, UserStore};
use crate::models::{RoleName, User};

/// Verified identity attached to an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub roles: BTreeSet<RoleName>,
}

impl Principal {
    pub fn new(username: impl Into<String>, roles: impl IntoIterator<Item = RoleName>) -> Self {
        Self {
            username: username.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_any_role(&self, roles: &[RoleName]) -> bool {
        roles.iter().any(|role| self.roles.contains(role))
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no user record for authenticated principal {0}")]
    UserNotFound(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Maps authenticated principals onto stored user records.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn resolve(&self, principal: &Principal) -> Result<User, IdentityError> {
        match self.users.find_by_username(&principal.username).await? {
            Some(user) => Ok(user),
            None => {
                // The token verified, so a missing row means the user table
                // and the token issuer have drifted apart.
                warn!(username = %principal.username, "authenticated principal has no user record");
                Err(IdentityError::UserNotFound(principal.username.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn resolves_known_username() {
        let store = Arc::new(MemoryStore::new());
        let alice = store.add_user("alice", &[RoleName::User]).await;
        let resolver = IdentityResolver::new(store);

        let user = resolver
            .resolve(&Principal::new("alice", [RoleName::User]))
            .await
            .unwrap();
        assert_eq!(user, alice);
    }

    #[tokio::test]
    async fn unknown_username_is_user_not_found() {
        let resolver = IdentityResolver::new(Arc::new(MemoryStore::new()));

        let err = resolver
            .resolve(&Principal::new("ghost", [RoleName::User]))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::UserNotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn storage_failures_are_not_reported_as_missing_users() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let resolver = IdentityResolver::new(store);

        let err = resolver
            .resolve(&Principal::new("alice", [RoleName::User]))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Storage(StoreError::Unavailable(_))));
    }

    #[test]
    fn role_check_matches_any_listed_role() {
        let admin = Principal::new("root", [RoleName::Admin]);
        assert!(admin.has_any_role(&[RoleName::User, RoleName::Admin]));
        assert!(!admin.has_any_role(&[RoleName::User]));
        assert!(!Principal::new("nobody", Vec::<RoleName>::new()).has_any_role(&RoleName::ALL));
    }
}
