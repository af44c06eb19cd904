pub mod memory;
pub mod persistence;
pub mod table;
pub mod view;

pub use memory::{InMemoryStore, TableStats};
pub use persistence::{SnapshotManager, StoreRows, StoreSnapshot};
pub use table::{Record, RowKey, Snapshot, Table, TableName};
pub use view::{EntityReader, ReadView};
