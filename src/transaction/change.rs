// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every row a transaction writes is logged before the write happens. On
// rollback the log is replayed newest-first and each key is undone in the
// store. Undo is idempotent per key, so logging a write that then failed
// is harmless.
//
// ============================================================================

use crate::storage::{RowKey, TableName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Insert(RowKey),
    Update(RowKey),
    Delete(RowKey),
}

impl Change {
    pub fn key(&self) -> RowKey {
        match self {
            Change::Insert(key) | Change::Update(key) | Change::Delete(key) => *key,
        }
    }

    /// Get the table affected by this change
    pub fn table_name(&self) -> TableName {
        self.key().table()
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Insert(key) => write!(f, "INSERT {}", key),
            Change::Update(key) => write!(f, "UPDATE {}", key),
            Change::Delete(key) => write!(f, "DELETE {}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GenreId, MovieId};

    #[test]
    fn test_change_table_name() {
        let change = Change::Delete(RowKey::MovieGenre(MovieId(1), GenreId(2)));
        assert_eq!(change.table_name(), TableName::MovieGenres);
        assert_eq!(change.to_string(), "DELETE movie_genres[1,2]");
    }
}
