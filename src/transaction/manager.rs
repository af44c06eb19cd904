// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Change, Transaction, TransactionId, TransactionState};
use crate::core::{CatalogError, Result};
use crate::storage::{InMemoryStore, Snapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

pub struct TransactionManager {
    // Full state of every running transaction.
    transactions: RwLock<HashMap<TransactionId, Transaction>>,

    // Ids of running transactions, copy-on-write so snapshots share the set.
    // Ids are only handed to writers while this lock is held for writing,
    // which keeps every snapshot consistent with the id sequence.
    active_ids: RwLock<Arc<HashSet<u64>>>,

    next_id: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    /// Ids start at 1; id 0 marks rows loaded from a snapshot file, which
    /// every snapshot sees as committed.
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            active_ids: RwLock::new(Arc::new(HashSet::new())),
            next_id: AtomicU64::new(1),
            committed: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
        }
    }

    pub async fn begin(&self) -> Result<(TransactionId, Snapshot)> {
        let snapshot = {
            let mut active_lock = self.active_ids.write().await;
            let tx_id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let snapshot = Snapshot {
                tx_id,
                active: Arc::clone(&active_lock),
                max_tx_id: tx_id,
            };
            let mut new_set = (**active_lock).clone();
            new_set.insert(tx_id);
            *active_lock = Arc::new(new_set);
            snapshot
        };

        let transaction_id = TransactionId(snapshot.tx_id);
        let transaction = Transaction::new(transaction_id, snapshot.clone());
        self.transactions
            .write()
            .await
            .insert(transaction_id, transaction);

        Ok((transaction_id, snapshot))
    }

    /// Snapshot for a reader that writes nothing. It is not registered as a
    /// transaction and needs no commit.
    pub async fn read_snapshot(&self) -> Snapshot {
        let active_lock = self.active_ids.read().await;
        let tx_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Snapshot {
            tx_id,
            active: Arc::clone(&active_lock),
            max_tx_id: tx_id,
        }
    }

    pub async fn record_change(&self, txn_id: TransactionId, change: Change) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions.get_mut(&txn_id).ok_or_else(|| {
            CatalogError::Transaction(format!("Transaction {} not found", txn_id))
        })?;
        transaction.record_change(change)
    }

    pub async fn record_changes(
        &self,
        txn_id: TransactionId,
        changes: impl IntoIterator<Item = Change>,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions.get_mut(&txn_id).ok_or_else(|| {
            CatalogError::Transaction(format!("Transaction {} not found", txn_id))
        })?;
        for change in changes {
            transaction.record_change(change)?;
        }
        Ok(())
    }

    pub async fn commit(&self, txn_id: TransactionId) -> Result<TransactionInfo> {
        let mut transaction = {
            let mut transactions = self.transactions.write().await;
            transactions.remove(&txn_id).ok_or_else(|| {
                CatalogError::Transaction(format!("Transaction {} not found", txn_id))
            })?
        };

        transaction.commit()?;
        self.remove_active(txn_id).await;
        self.committed.fetch_add(1, Ordering::SeqCst);

        Ok(TransactionInfo::from(&transaction))
    }

    /// Undo every logged write in `storage`, newest first, then retire the
    /// transaction. Rolling back an unknown transaction is a no-op.
    pub async fn rollback_with_storage(
        &self,
        txn_id: TransactionId,
        storage: &InMemoryStore,
    ) -> Result<()> {
        let removed = self.transactions.write().await.remove(&txn_id);
        let Some(mut transaction) = removed else {
            return Ok(());
        };

        let changes = transaction.rollback()?;
        // The id stays in the active set until undo finishes, so no snapshot
        // can mistake a half-undone write for a committed one.
        for change in changes.iter().rev() {
            storage.undo(change.key(), txn_id.0).await?;
        }
        self.remove_active(txn_id).await;
        self.aborted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_active(&self, txn_id: TransactionId) {
        let mut active_lock = self.active_ids.write().await;
        if active_lock.contains(&txn_id.0) {
            let mut new_set = (**active_lock).clone();
            new_set.remove(&txn_id.0);
            *active_lock = Arc::new(new_set);
        }
    }

    pub async fn active_count(&self) -> usize {
        self.active_ids.read().await.len()
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            committed: self.committed.load(Ordering::SeqCst),
            aborted: self.aborted.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub change_count: usize,
    pub duration: std::time::Duration,
}

impl From<&Transaction> for TransactionInfo {
    fn from(txn: &Transaction) -> Self {
        Self {
            id: txn.id(),
            state: txn.state(),
            change_count: txn.change_count(),
            duration: txn.duration(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub committed: u64,
    pub aborted: u64,
}
