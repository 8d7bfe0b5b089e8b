use std::future::Future;
use std::pin::Pin;

use gigcore_core::error::CoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

/// Transactions borrowed from a pool carry `'static` — only the `&mut`
/// reference passed into the `in_txn` callback is short-lived.
pub type Txn = Transaction<'static, Postgres>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Owns the connection pool. Exposes a query primitive (`pool`, for
/// read-only helper queries outside a transaction) and the transactional
/// scope primitive every multi-row domain write goes through.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        info!("schema migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The transactional-scope primitive (§4.A): runs `f` against a
    /// connection holding an open transaction, committing on `Ok` and
    /// rolling back on `Err` (dropping the transaction without `commit()`).
    pub async fn in_txn<'a, F, T>(&'a self, f: F) -> Result<T, CoreError>
    where
        F: for<'c> FnOnce(&'c mut Txn) -> BoxFuture<'c, Result<T, CoreError>> + Send + 'a,
        T: Send + 'a,
    {
        let mut txn = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        let result = f(&mut txn).await;
        match result {
            Ok(value) => {
                txn.commit()
                    .await
                    .map_err(|e| CoreError::Storage(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    /// The DB clock is the time authority (§4.F): "processed at" timestamps
    /// always come from here, never from an external provider's `created`.
    pub async fn now(&self) -> Result<chrono::DateTime<chrono::Utc>, CoreError> {
        sqlx::query_scalar("SELECT now()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))
    }
}
