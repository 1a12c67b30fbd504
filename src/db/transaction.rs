//! Atomic-unit helper.
//!
//! Wraps `TransactionTrait::transaction` so callers keep their own
//! [`ServiceError`] (rollback on `Err`, commit on `Ok`) instead of getting a
//! nested `TransactionError`.

use crate::errors::ServiceError;
use futures::future::BoxFuture;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionError, TransactionTrait};
use tracing::debug;

/// Execute `f` inside one database transaction.
///
/// ```rust,ignore
/// let model = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let row = entity.insert(txn).await?;
///         stock_ledger::apply_delta(txn, item_id, location_id, 5).await?;
///         Ok(row)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T>(db: &DatabaseConnection, f: F) -> Result<T, ServiceError>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>> + Send,
    T: Send,
{
    let start = std::time::Instant::now();
    counter!("stockyard_db.transaction.started", 1);

    let result = db.transaction::<_, T, ServiceError>(f).await;

    histogram!("stockyard_db.transaction.duration", start.elapsed());
    match &result {
        Ok(_) => {
            counter!("stockyard_db.transaction.committed", 1);
        }
        Err(_) => {
            counter!("stockyard_db.transaction.rolled_back", 1);
            debug!("transaction rolled back after {:?}", start.elapsed());
        }
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(err) => err,
    })
}
