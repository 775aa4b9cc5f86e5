use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::util::TimedClientExt;
use crate::db::{PgStore, StoreError, UserStore};
use crate::models::{RoleName, User};

const USER_WITH_ROLES: &str = "SELECT u.id, u.username,
        COALESCE(array_agg(r.name) FILTER (WHERE r.name IS NOT NULL), '{}'::text[]) AS roles
     FROM jobtrack.users u
     LEFT JOIN jobtrack.user_roles ur ON ur.user_id = u.id
     LEFT JOIN jobtrack.roles r ON r.id = ur.role_id";

fn parse_roles(names: Vec<String>) -> Result<BTreeSet<RoleName>, StoreError> {
    names
        .iter()
        .map(|name| {
            RoleName::from_str(name)
                .map_err(|_| StoreError::Mapping(format!("unknown role: {name}")))
        })
        .collect()
}

fn row_to_user(row: &Row) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        roles: parse_roles(row.try_get("roles")?)?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    #[instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .timed_query_opt_cached(
                &format!("{USER_WITH_ROLES} WHERE u.username = $1 GROUP BY u.id, u.username"),
                &[&username],
                "users_find_by_username",
            )
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .timed_query_opt_cached(
                &format!("{USER_WITH_ROLES} WHERE u.id = $1 GROUP BY u.id, u.username"),
                &[&id],
                "users_find_by_id",
            )
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roles_collects_known_names() {
        let roles = parse_roles(vec!["ROLE_ADMIN".into(), "ROLE_USER".into()]).unwrap();
        assert!(roles.contains(&RoleName::User));
        assert!(roles.contains(&RoleName::Admin));
    }

    #[test]
    fn parse_roles_rejects_unknown_names() {
        let err = parse_roles(vec!["ROLE_ROOT".into()]).unwrap_err();
        assert!(err.to_string().contains("unknown role"));
    }
}
