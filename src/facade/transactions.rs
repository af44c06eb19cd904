use crate::connection::{ConnectionPool, PoolGuard, Tx};
use crate::core::{CatalogError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Runs units of work inside a single outermost transaction.
///
/// The unit of work gets a [`Tx`] handle and nothing else: it cannot commit,
/// roll back, or open a nested transaction. Each call runs on its own task,
/// so a caller that stops polling does not stop the commit or rollback, and
/// the connection is always handed back to the pool.
#[derive(Clone)]
pub struct TransactionCoordinator {
    pool: Arc<ConnectionPool>,
}

impl TransactionCoordinator {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Commit when `work` returns `Ok`, roll back on `Err` or panic.
    pub async fn with_transaction<T, F, Fut>(&self, operation: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Tx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        let span = info_span!("catalog.transaction", operation = operation);
        let unit = async move {
            let mut guard = pool.get_connection().await?;
            let outcome = run_in_transaction(&mut guard, work).await;
            if let Err(err) = guard.close().await {
                event!(Level::ERROR, error = %err, "connection release failed");
            }
            outcome
        }
        .instrument(span);

        match tokio::spawn(unit).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(CatalogError::Transaction(format!(
                "{} task did not complete: {}",
                operation, join_err
            ))),
        }
    }
}

async fn run_in_transaction<T, F, Fut>(guard: &mut PoolGuard, work: F) -> Result<T>
where
    F: FnOnce(Tx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let connection = guard.connection()?;
    let tx = connection.begin().await?;
    let txn_id = tx.id();
    event!(Level::DEBUG, txn = %txn_id, "transaction started");

    let outcome = AssertUnwindSafe(async move { work(tx).await })
        .catch_unwind()
        .await;

    let err = match outcome {
        Ok(Ok(value)) => match connection.commit().await {
            Ok(info) => {
                event!(
                    Level::DEBUG,
                    txn = %txn_id,
                    changes = info.change_count,
                    elapsed_ms = info.duration.as_millis() as u64,
                    "transaction committed"
                );
                return Ok(value);
            }
            Err(err) => err,
        },
        Ok(Err(err)) => err,
        Err(payload) => CatalogError::Transaction(format!(
            "unit of work panicked: {}",
            panic_message(payload.as_ref())
        )),
    };

    if err.is_retryable() {
        event!(Level::WARN, txn = %txn_id, error = %err, "transaction aborted, retryable");
    } else {
        event!(Level::INFO, txn = %txn_id, error = %err, "transaction aborted");
    }
    if let Err(rollback_err) = connection.rollback().await {
        event!(Level::ERROR, txn = %txn_id, error = %rollback_err, "rollback failed");
    }
    Err(err)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
