//! Database transaction utilities
//!
//! Multi-statement operations such as the catalog merge run inside a
//! [`TransactionGuard`] so they either apply completely or not at all.

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use vidcat_core::AppError;

/// A database transaction that must be finished explicitly.
///
/// A guard dropped without [`commit`](Self::commit) is rolled back by sqlx when
/// the connection returns to the pool.
///
/// # Example
///
/// ```ignore
/// use vidcat_db::TransactionGuard;
///
/// async fn example(pool: &sqlx::PgPool) -> Result<(), vidcat_core::AppError> {
///     let mut tx = TransactionGuard::begin(pool, "example").await?;
///     sqlx::query("UPDATE videos SET ...").execute(tx.conn()?).await?;
///     tx.commit().await
/// }
/// ```
pub struct TransactionGuard {
    transaction: Option<Transaction<'static, Postgres>>,
    operation: &'static str,
}

impl TransactionGuard {
    /// Begin a new database transaction
    pub async fn begin(pool: &PgPool, operation: &'static str) -> Result<Self, AppError> {
        let transaction = pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, operation, "Failed to begin database transaction");
            AppError::Database(e)
        })?;

        Ok(Self {
            transaction: Some(transaction),
            operation,
        })
    }

    /// Connection to run statements on inside the transaction.
    pub fn conn(&mut self) -> Result<&mut PgConnection, AppError> {
        let operation = self.operation;
        self.transaction.as_deref_mut().ok_or_else(|| {
            AppError::Internal(format!(
                "Transaction for {} was already finished",
                operation
            ))
        })
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    /// Rollback the transaction
    pub async fn rollback(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            tracing::debug!(
                operation = self.operation,
                "Transaction dropped without commit, rolling back"
            );
        }
    }
}
