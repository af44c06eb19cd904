pub mod config;
pub mod pool;
pub mod tx;

use crate::core::{CatalogError, Result};
use crate::storage::InMemoryStore;
use crate::transaction::{TransactionInfo, TransactionManager};
use std::sync::Arc;

pub use config::CatalogConfig;
pub use pool::{ConnectionPool, PoolGuard, PoolStats};
pub use tx::Tx;

/// Session handle onto the shared store.
///
/// A connection runs at most one transaction at a time. Nested `begin` is
/// rejected rather than flattened.
pub struct Connection {
    /// Unique connection ID
    id: u64,
    store: Arc<InMemoryStore>,
    manager: Arc<TransactionManager>,
    state: ConnectionState,
    /// Open transaction (if any)
    transaction: Option<Tx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    InTransaction,
    Closed,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        store: Arc<InMemoryStore>,
        manager: Arc<TransactionManager>,
    ) -> Self {
        Self {
            id,
            store,
            manager,
            state: ConnectionState::Active,
            transaction: None,
        }
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Begin a new transaction and hand out its write handle.
    pub async fn begin(&mut self) -> Result<Tx> {
        if self.state == ConnectionState::Closed {
            return Err(CatalogError::Transaction("Connection is closed".into()));
        }

        if self.state == ConnectionState::InTransaction {
            return Err(CatalogError::Transaction("Transaction already active".into()));
        }

        let (txn_id, snapshot) = self.manager.begin().await?;
        let tx = Tx::new(
            txn_id,
            snapshot,
            Arc::clone(&self.store),
            Arc::clone(&self.manager),
        );

        self.state = ConnectionState::InTransaction;
        self.transaction = Some(tx.clone());
        Ok(tx)
    }

    /// Commit the current transaction
    pub async fn commit(&mut self) -> Result<TransactionInfo> {
        let tx = self
            .transaction
            .as_ref()
            .ok_or_else(|| CatalogError::Transaction("No active transaction".into()))?;

        let info = self.manager.commit(tx.id()).await?;
        self.state = ConnectionState::Active;
        self.transaction = None;
        Ok(info)
    }

    /// Roll back the current transaction. Without one this does nothing.
    pub async fn rollback(&mut self) -> Result<()> {
        let Some(tx) = self.transaction.take() else {
            return Ok(());
        };

        self.state = ConnectionState::Active;
        self.manager
            .rollback_with_storage(tx.id(), &self.store)
            .await
    }

    /// The open transaction, if any
    pub fn transaction(&self) -> Option<&Tx> {
        self.transaction.as_ref()
    }

    /// Check if connection is in a transaction
    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    /// Check if connection is active
    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Close the connection, rolling back any open transaction.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::InTransaction {
            self.rollback().await?;
        }

        self.state = ConnectionState::Closed;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(tx) = &self.transaction {
            log::warn!(
                "Connection {} dropped with open transaction {}. Use close().await to roll back.",
                self.id,
                tx.id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EntityReader;

    fn create_test_connection() -> Connection {
        Connection::new(
            1,
            InMemoryStore::shared(std::time::Duration::from_secs(1)),
            Arc::new(TransactionManager::new()),
        )
    }

    #[tokio::test]
    async fn test_connection_creation() {
        let conn = create_test_connection();
        assert_eq!(conn.id(), 1);
        assert!(conn.is_active());
        assert!(!conn.is_in_transaction());
        assert!(conn.transaction().is_none());
    }

    #[tokio::test]
    async fn test_transaction_lifecycle() {
        let mut conn = create_test_connection();

        let tx = conn.begin().await.unwrap();
        assert!(conn.is_in_transaction());
        tx.insert_genre("Drama").await.unwrap();

        let info = conn.commit().await.unwrap();
        assert_eq!(info.change_count, 1);
        assert!(!conn.is_in_transaction());
    }

    #[tokio::test]
    async fn test_nested_begin_rejected() {
        let mut conn = create_test_connection();
        conn.begin().await.unwrap();

        let err = conn.begin().await.err().unwrap();
        assert_eq!(
            err,
            CatalogError::Transaction("Transaction already active".into())
        );
        conn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let mut conn = create_test_connection();

        let tx = conn.begin().await.unwrap();
        let genre = tx.insert_genre("Noir").await.unwrap();
        assert!(tx.genres(&[genre.id]).await.unwrap().len() == 1);

        conn.rollback().await.unwrap();
        assert!(!conn.is_in_transaction());

        let tx = conn.begin().await.unwrap();
        assert!(tx.genres(&[genre.id]).await.unwrap().is_empty());
        conn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_without_transaction_fails() {
        let mut conn = create_test_connection();
        assert!(conn.commit().await.is_err());
        assert!(conn.rollback().await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_close() {
        let mut conn = create_test_connection();
        conn.begin().await.unwrap();

        assert!(conn.close().await.is_ok());
        assert!(!conn.is_active());
        assert!(conn.begin().await.is_err());
    }
}
