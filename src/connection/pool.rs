use super::{CatalogConfig, Connection};
use crate::core::{CatalogError, ConflictReason, Result};
use crate::storage::InMemoryStore;
use crate::transaction::TransactionManager;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Connection pool
///
/// Bounds how many units of work may hold a connection at once. Connections
/// are cheap handles onto the shared store, so the pool mostly acts as an
/// admission limit with a bounded wait.
pub struct ConnectionPool {
    /// Pool configuration
    config: CatalogConfig,
    /// Available connections
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// Total number of connections handed out or idle
    total_connections: Arc<AtomicUsize>,
    store: Arc<InMemoryStore>,
    manager: Arc<TransactionManager>,
    next_id: AtomicU64,
}

/// A connection from the pool
struct PooledConnection {
    connection: Connection,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Connection) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn returned(connection: Connection, created_at: Instant) -> Self {
        Self {
            connection,
            created_at,
            last_used: Instant::now(),
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|lifetime| self.created_at.elapsed() > lifetime)
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        idle_timeout.is_some_and(|timeout| self.last_used.elapsed() > timeout)
    }
}

impl ConnectionPool {
    pub async fn new(
        config: CatalogConfig,
        store: Arc<InMemoryStore>,
        manager: Arc<TransactionManager>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            store,
            manager,
            next_id: AtomicU64::new(1),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections().await;

        Ok(pool)
    }

    /// Get a connection from the pool, waiting up to `connect_timeout`.
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            if let Some(pooled) = self.try_get_available().await {
                return Ok(self.guard(pooled.connection, pooled.created_at));
            }

            if let Some(conn) = self.try_create_connection() {
                return Ok(self.guard(conn, Instant::now()));
            }

            if start.elapsed() > self.config.connect_timeout {
                return Err(CatalogError::timeout(
                    ConflictReason::PoolTimeout,
                    format!(
                        "no connection available within {:?}",
                        self.config.connect_timeout
                    ),
                ));
            }

            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn guard(&self, connection: Connection, created_at: Instant) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            created_at,
            pool: Arc::clone(&self.available),
            total_connections: Arc::clone(&self.total_connections),
        }
    }

    /// Take the first idle connection, discarding stale ones on the way.
    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let before = available.len();
        available.retain(|pooled| {
            !pooled.is_expired(self.config.max_lifetime)
                && !pooled.is_idle_too_long(self.config.idle_timeout)
        });
        let removed = before - available.len();

        if removed > 0 {
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
            log::debug!("Discarded {} stale pooled connections", removed);
        }

        available.pop_front()
    }

    /// Create a new connection if under limit
    fn try_create_connection(&self) -> Option<Connection> {
        let max = self.config.max_connections;
        self.total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < max).then_some(total + 1)
            })
            .ok()?;

        Some(self.new_connection())
    }

    fn new_connection(&self) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Connection::new(id, Arc::clone(&self.store), Arc::clone(&self.manager))
    }

    async fn ensure_min_connections(&self) {
        let mut available = self.available.lock().await;

        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            available.push_back(PooledConnection::new(self.new_connection()));
            self.total_connections.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Prefer [`PoolGuard::close`], which can roll back an open transaction
/// before returning the connection.
pub struct PoolGuard {
    connection: Option<Connection>,
    created_at: Instant,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
}

impl PoolGuard {
    /// Get a reference to the connection
    pub fn connection(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| CatalogError::Transaction("Connection already returned to pool".into()))
    }

    /// Roll back any open transaction and return the connection to the pool.
    pub async fn close(mut self) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            let rolled_back = if connection.is_in_transaction() {
                connection.rollback().await
            } else {
                Ok(())
            };

            let mut pool = self.pool.lock().await;
            pool.push_back(PooledConnection::returned(connection, self.created_at));
            rolled_back?;
        }
        Ok(())
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if connection.is_in_transaction() {
                log::warn!(
                    "PoolGuard dropped with active transaction. Connection {} discarded because async rollback is not possible in Drop. Use pool_guard.close().await.",
                    connection.id()
                );
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                return;
            }

            if let Ok(mut pool) = self.pool.try_lock() {
                pool.push_back(PooledConnection::returned(connection, self.created_at));
            } else {
                log::warn!(
                    "PoolGuard dropped and pool lock busy. Connection {} discarded.",
                    connection.id()
                );
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool(config: CatalogConfig) -> ConnectionPool {
        ConnectionPool::new(
            config,
            InMemoryStore::shared(Duration::from_secs(1)),
            Arc::new(TransactionManager::new()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = pool(CatalogConfig::new().min_connections(2).max_connections(5)).await;
        let stats = pool.stats().await;

        assert_eq!(stats.total_connections, 2); // min_connections
        assert_eq!(stats.available_connections, 2);
    }

    #[tokio::test]
    async fn test_get_connection() {
        let pool = pool(CatalogConfig::new().max_connections(5)).await;
        let mut guard = pool.get_connection().await.unwrap();

        assert!(guard.connection().unwrap().is_active());
        guard.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_returns_connection_to_pool() {
        let pool = pool(CatalogConfig::new().min_connections(1).max_connections(5)).await;

        let guard = pool.get_connection().await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.available_connections, 0);

        guard.close().await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.available_connections, 1);
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transaction() {
        let pool = pool(CatalogConfig::new().max_connections(1)).await;

        let mut guard = pool.get_connection().await.unwrap();
        guard.connection().unwrap().begin().await.unwrap();
        guard.close().await.unwrap();

        let mut guard = pool.get_connection().await.unwrap();
        assert!(!guard.connection().unwrap().is_in_transaction());
        guard.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_max_connections_limit() {
        let pool = pool(
            CatalogConfig::new()
                .max_connections(2)
                .connect_timeout(Duration::from_millis(50)),
        )
        .await;

        let _conn1 = pool.get_connection().await.unwrap();
        let _conn2 = pool.get_connection().await.unwrap();

        let err = pool.get_connection().await.err().unwrap();
        assert!(matches!(
            err,
            CatalogError::ConflictOrTimeout {
                reason: ConflictReason::PoolTimeout,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_pool_stats() {
        let pool = pool(CatalogConfig::new().min_connections(2).max_connections(10)).await;
        let stats = pool.stats().await;

        assert_eq!(stats.max_connections, 10);
        assert_eq!(stats.total_connections, 2);
        assert_eq!(
            stats.to_string(),
            "Pool Stats: 0/2 active, 2 available, max 10"
        );
    }
}
