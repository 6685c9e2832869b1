use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::store::PgStore;

/// Postgres pool plus the embedded booking engine schema.
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        // Every booking operation holds one connection for its whole
        // transaction, so waiting long for a slot only piles up requests.
        let pool = PgPoolOptions::new()
            .max_connections(pool_size.max(1))
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .connect(url)
            .await?;

        Ok(Database { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Applying booking engine schema");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Schema up to date");
        Ok(())
    }

    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
