// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Snapshot isolation over the MVCC entity store:
// - State: transaction lifecycle (Active, Committed, Aborted)
// - Change log: keys written, replayed in reverse on rollback
// - Manager: id allocation, snapshots, commit and rollback
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{TransactionInfo, TransactionManager, TransactionStats};
pub use state::{Transaction, TransactionId, TransactionState};
