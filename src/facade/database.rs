use crate::catalog::{MoviePage, MoviePatch, MovieQuery, MovieReader, MovieWriter, NewMovie};
use crate::connection::{CatalogConfig, ConnectionPool, PoolStats};
use crate::core::{CatalogError, Director, Genre, MovieAggregate, MovieId, Result};
use crate::facade::TransactionCoordinator;
use crate::storage::{InMemoryStore, SnapshotManager, StoreSnapshot, TableStats};
use crate::transaction::{TransactionManager, TransactionStats};
use std::sync::Arc;
use tracing::{Level, event};

/// Rows restored from a snapshot file carry this creator id, which every
/// snapshot treats as committed.
const RESTORED_TX_ID: u64 = 0;

/// Entry point to the movie catalog.
///
/// Built once at startup from a [`CatalogConfig`] and shared by reference
/// (or cloned; clones share the same store).
///
/// ```
/// use cinedb::{Catalog, CatalogConfig, MovieQuery, NewMovie};
///
/// # #[tokio::main]
/// # async fn main() -> cinedb::Result<()> {
/// let catalog = Catalog::open(CatalogConfig::new()).await?;
/// let director = catalog.add_director("Christopher Nolan").await?;
/// let genre = catalog.add_genre("Sci-Fi").await?;
///
/// let id = catalog
///     .create_movie(NewMovie::new("Inception", "dream heist", director.id, [genre.id]))
///     .await?;
///
/// let movie = catalog.get_movie(id).await?;
/// assert_eq!(movie.title, "Inception");
/// assert_eq!(catalog.search_movies(MovieQuery::title("cep")).await?.total, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Catalog {
    store: Arc<InMemoryStore>,
    manager: Arc<TransactionManager>,
    coordinator: TransactionCoordinator,
    writer: MovieWriter,
    reader: MovieReader,
    persistence: Option<SnapshotManager>,
}

impl Catalog {
    /// Open a catalog, restoring the snapshot at `snapshot_path` when one
    /// is configured and present.
    pub async fn open(config: CatalogConfig) -> Result<Self> {
        config.validate()?;

        let store = InMemoryStore::shared(config.lock_timeout);
        let manager = Arc::new(TransactionManager::new());

        let persistence = config.snapshot_path.as_ref().map(SnapshotManager::new);
        if let Some(persistence) = &persistence
            && let Some(snapshot) = persistence.load()?
        {
            let rows = snapshot.rows.row_count();
            store.restore_rows(snapshot.rows, RESTORED_TX_ID).await?;
            event!(
                Level::INFO,
                path = %persistence.path().display(),
                rows,
                "catalog snapshot restored"
            );
        }

        let pool = ConnectionPool::new(config.clone(), Arc::clone(&store), Arc::clone(&manager))
            .await?;
        let coordinator = TransactionCoordinator::new(Arc::new(pool));

        Ok(Self {
            writer: MovieWriter::new(coordinator.clone()),
            reader: MovieReader::new(
                Arc::clone(&store),
                Arc::clone(&manager),
                config.case_sensitive_search,
            ),
            store,
            manager,
            coordinator,
            persistence,
        })
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn writer(&self) -> &MovieWriter {
        &self.writer
    }

    pub fn reader(&self) -> &MovieReader {
        &self.reader
    }

    pub async fn create_movie(&self, command: NewMovie) -> Result<MovieId> {
        self.writer.create_movie(command).await
    }

    pub async fn update_movie(&self, id: MovieId, patch: MoviePatch) -> Result<MovieId> {
        self.writer.update_movie(id, patch).await
    }

    pub async fn delete_movie(&self, id: MovieId) -> Result<MovieId> {
        self.writer.delete_movie(id).await
    }

    pub async fn get_movie(&self, id: MovieId) -> Result<MovieAggregate> {
        self.reader.get_movie(id).await
    }

    pub async fn search_movies(&self, query: MovieQuery) -> Result<MoviePage> {
        self.reader.search_movies(query).await
    }

    pub async fn add_director(&self, name: impl Into<String>) -> Result<Director> {
        let name = name.into();
        self.coordinator
            .with_transaction("add_director", move |tx| async move {
                tx.insert_director(name).await
            })
            .await
    }

    pub async fn add_genre(&self, name: impl Into<String>) -> Result<Genre> {
        let name = name.into();
        self.coordinator
            .with_transaction("add_genre", move |tx| async move { tx.insert_genre(name).await })
            .await
    }

    pub async fn list_directors(&self) -> Result<Vec<Director>> {
        let snapshot = self.manager.read_snapshot().await;
        self.store.list_directors(&snapshot).await
    }

    pub async fn list_genres(&self) -> Result<Vec<Genre>> {
        let snapshot = self.manager.read_snapshot().await;
        self.store.list_genres(&snapshot).await
    }

    /// Write every committed row to the configured snapshot file and
    /// return how many rows were written.
    pub async fn save_snapshot(&self) -> Result<usize> {
        let persistence = self
            .persistence
            .as_ref()
            .ok_or_else(|| CatalogError::Config("no snapshot_path configured".into()))?;

        let snapshot = self.manager.read_snapshot().await;
        let rows = self.store.committed_rows(&snapshot).await?;
        let count = rows.row_count();
        persistence.save(&StoreSnapshot::new(rows))?;

        event!(
            Level::INFO,
            path = %persistence.path().display(),
            rows = count,
            "catalog snapshot saved"
        );
        Ok(count)
    }

    pub async fn table_stats(&self) -> TableStats {
        self.store.table_stats().await
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.coordinator.pool().stats().await
    }

    pub fn transaction_stats(&self) -> TransactionStats {
        self.manager.stats()
    }
}
