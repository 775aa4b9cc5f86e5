use std::str::FromStr;

use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::util::TimedClientExt;
use crate::db::{PgStore, RoleStore, StoreError};
use crate::models::{Role, RoleName};

fn row_to_role(row: &Row) -> Result<Role, StoreError> {
    let name: String = row.try_get("name")?;
    Ok(Role {
        id: row.try_get("id")?,
        name: RoleName::from_str(&name)
            .map_err(|_| StoreError::Mapping(format!("unknown role: {name}")))?,
    })
}

#[async_trait]
impl RoleStore for PgStore {
    #[instrument(skip(self))]
    async fn find_by_name(&self, name: RoleName) -> Result<Option<Role>, StoreError> {
        let name: &str = name.as_ref();
        let client = self.pool.get().await?;
        let row = client
            .timed_query_opt_cached(
                "SELECT id, name FROM jobtrack.roles WHERE name = $1",
                &[&name],
                "roles_find_by_name",
            )
            .await?;
        row.as_ref().map(row_to_role).transpose()
    }

    #[instrument(skip(self))]
    async fn insert(&self, name: RoleName) -> Result<Role, StoreError> {
        let name: &str = name.as_ref();
        let client = self.pool.get().await?;
        let row = client
            .timed_query_one_cached(
                "INSERT INTO jobtrack.roles (name) VALUES ($1)
                 ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                 RETURNING id, name",
                &[&name],
                "roles_insert",
            )
            .await?;
        row_to_role(&row)
    }
}
