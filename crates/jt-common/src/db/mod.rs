/// Declare a storage error enum carrying the pool and postgres variants every
/// store function can produce, plus any extra variants passed in.
macro_rules! db_error {
    ($name:ident { $($extra:tt)* }) => {
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            #[error("failed to get postgres connection: {0}")]
            Pool(#[from] deadpool_postgres::PoolError),
            #[error("postgres error: {0}")]
            Postgres(#[from] tokio_postgres::Error),
            $($extra)*
        }
    };
}

pub mod jobs;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod roles;
pub mod store;
pub mod users;
pub mod util;

// Keep re-exports unique so downstream crates see a single symbol per helper.
pub use memory::MemoryStore;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, PgStore, create_pool_from_url, create_pool_from_url_checked};
pub use store::{JobStore, RoleStore, StoreError, Stores, UserStore};
