use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PoolError};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;

use crate::config::Config;
use crate::types::ApiResult;
use crate::utils::blocking;

pub mod schema;

// An alias to the type for a pool of Diesel Postgres connections.
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

error_chain! {
    foreign_links {
        R2D2(PoolError);
        Diesel(DieselError);
    }
}

pub fn init_pool(config: &Config) -> Result<Pool> {
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.as_str());
    Ok(Pool::builder()
        .max_size(config.database_pool_size)
        .build(manager)?)
}

/// Builds a pool that opens no connection until one is asked for.
pub fn lazy_pool(database_url: &str) -> Pool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .min_idle(Some(0))
        .max_size(1)
        .connection_timeout(Duration::from_secs(1))
        .build_unchecked(manager)
}

pub fn run_migrations(pool: &Pool) -> Result<usize> {
    let mut connection = pool.get()?;
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::from(format!("failed to run migrations: {}", e)))?;
    Ok(applied.len())
}

/// Runs blocking Diesel work on a pooled connection without stalling the
/// async executor.
pub async fn run<F, T>(pool: &Pool, work: F) -> ApiResult<T>
where
    F: FnOnce(&mut PgConnection) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    blocking(move || {
        let mut connection = pool.get()?;
        work(&mut connection)
    })
    .await
}
