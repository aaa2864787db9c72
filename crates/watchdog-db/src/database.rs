//! Connection pool and table management.

use crate::error::Result;
use crate::schema;
use deadpool_postgres::{Config, Object, Pool, PoolConfig, Runtime};
use tokio_postgres::NoTls;

/// Main database handle. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Build a pool for `url`. No connection is opened until first use.
    pub fn connect(url: &str, max_connections: usize) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(url.to_string());
        cfg.pool = Some(PoolConfig::new(max_connections.max(1)));
        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(Self { pool })
    }

    pub(crate) async fn client(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }

    /// Round-trip a trivial query to confirm the database is reachable.
    pub async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Create the findings table and its indexes if they don't exist.
    pub async fn initialize(&self) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(schema::FINDINGS_DDL).await?;
        tracing::info!(table = schema::TABLE_FINDINGS, "Findings table ready");
        Ok(())
    }

    /// Check if a table exists in the current search path.
    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = $1",
                &[&name],
            )
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count > 0)
    }
}
