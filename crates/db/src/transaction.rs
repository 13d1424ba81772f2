//! Run a unit of work inside one database transaction.

use futures::future::BoxFuture;
use sqlx::PgConnection;
use tessera_core::error::CoreError;

use crate::error::map_db_error;
use crate::DbPool;

/// Begin a transaction, run `f` against its connection, and commit when `f`
/// returns `Ok`. Any `Err` (or a panic or a dropped future) rolls back.
///
/// The closure must own what it captures; the returned future may only borrow
/// the connection.
///
/// ```ignore
/// let user = with_transaction(&pool, move |conn| {
///     Box::pin(async move {
///         let user = UserRepo::create(&mut *conn, &input).await.map_err(map_db_error)?;
///         OutboxRepo::insert(&mut *conn, &event).await.map_err(map_db_error)?;
///         Ok(user)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<T, F>(pool: &DbPool, f: F) -> Result<T, CoreError>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, CoreError>> + Send,
{
    let mut tx = pool.begin().await.map_err(map_db_error)?;

    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await.map_err(map_db_error)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Transaction rollback failed");
            }
            Err(e)
        }
    }
}
