use super::persistence::StoreRows;
use super::table::{Record, RowKey, Snapshot, Table, TableName};
use crate::core::{
    CatalogError, ConflictReason, Director, DirectorId, Genre, GenreId, Movie, MovieDetail,
    MovieDetailId, MovieGenre, MovieId, Result,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Store-assigned identifier sequences. Values handed out are never reused,
/// even when the inserting transaction rolls back.
#[derive(Debug)]
struct Sequences {
    movies: AtomicU64,
    details: AtomicU64,
    directors: AtomicU64,
    genres: AtomicU64,
}

impl Sequences {
    fn new() -> Self {
        Self {
            movies: AtomicU64::new(1),
            details: AtomicU64::new(1),
            directors: AtomicU64::new(1),
            genres: AtomicU64::new(1),
        }
    }

    fn next(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst)
    }

    fn bump_past(counter: &AtomicU64, used: u64) {
        counter.fetch_max(used + 1, Ordering::SeqCst);
    }
}

/// The entity store: one MVCC table per entity kind plus the link table,
/// each with its own lock.
pub struct InMemoryStore {
    movies: RwLock<Table<Movie>>,
    details: RwLock<Table<MovieDetail>>,
    directors: RwLock<Table<Director>>,
    genres: RwLock<Table<Genre>>,
    movie_genres: RwLock<Table<MovieGenre>>,
    sequences: Sequences,
    lock_timeout: Duration,
}

impl InMemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            movies: RwLock::new(Table::new()),
            details: RwLock::new(Table::new()),
            directors: RwLock::new(Table::new()),
            genres: RwLock::new(Table::new()),
            movie_genres: RwLock::new(Table::new()),
            sequences: Sequences::new(),
            lock_timeout,
        }
    }

    pub fn shared(lock_timeout: Duration) -> Arc<Self> {
        Arc::new(Self::new(lock_timeout))
    }

    async fn read<'a, R: Record>(
        &self,
        lock: &'a RwLock<Table<R>>,
    ) -> Result<RwLockReadGuard<'a, Table<R>>> {
        self.bounded(R::TABLE, lock.read()).await
    }

    async fn write<'a, R: Record>(
        &self,
        lock: &'a RwLock<Table<R>>,
    ) -> Result<RwLockWriteGuard<'a, Table<R>>> {
        self.bounded(R::TABLE, lock.write()).await
    }

    async fn bounded<G>(
        &self,
        table: TableName,
        acquire: impl Future<Output = G>,
    ) -> Result<G> {
        tokio::time::timeout(self.lock_timeout, acquire)
            .await
            .map_err(|_| {
                CatalogError::timeout(
                    ConflictReason::LockTimeout,
                    format!("could not lock table {} within {:?}", table, self.lock_timeout),
                )
            })
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub async fn get_movie(&self, id: MovieId, snapshot: &Snapshot) -> Result<Option<Movie>> {
        Ok(self.read(&self.movies).await?.get(&id, snapshot))
    }

    pub async fn get_detail(
        &self,
        id: MovieDetailId,
        snapshot: &Snapshot,
    ) -> Result<Option<MovieDetail>> {
        Ok(self.read(&self.details).await?.get(&id, snapshot))
    }

    pub async fn get_director(
        &self,
        id: DirectorId,
        snapshot: &Snapshot,
    ) -> Result<Option<Director>> {
        Ok(self.read(&self.directors).await?.get(&id, snapshot))
    }

    /// Genres whose id is in `ids`, in id order. Unknown ids are skipped.
    pub async fn find_genres(&self, ids: &[GenreId], snapshot: &Snapshot) -> Result<Vec<Genre>> {
        let table = self.read(&self.genres).await?;
        let mut wanted: Vec<GenreId> = ids.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        Ok(wanted
            .into_iter()
            .filter_map(|id| table.get(&id, snapshot))
            .collect())
    }

    pub async fn list_directors(&self, snapshot: &Snapshot) -> Result<Vec<Director>> {
        Ok(self.read(&self.directors).await?.scan(snapshot))
    }

    pub async fn list_genres(&self, snapshot: &Snapshot) -> Result<Vec<Genre>> {
        Ok(self.read(&self.genres).await?.scan(snapshot))
    }

    /// Movies in id order, optionally restricted by a title predicate.
    pub async fn scan_movies(
        &self,
        snapshot: &Snapshot,
        filter: &(dyn for<'m> Fn(&'m Movie) -> bool + Send + Sync),
    ) -> Result<Vec<Movie>> {
        let table = self.read(&self.movies).await?;
        let mut movies = table.scan(snapshot);
        movies.retain(|movie| filter(movie));
        Ok(movies)
    }

    pub async fn genre_links(&self, movie_id: MovieId, snapshot: &Snapshot) -> Result<Vec<GenreId>> {
        let table = self.read(&self.movie_genres).await?;
        Ok(table
            .range(
                (movie_id, GenreId::MIN)..=(movie_id, GenreId::MAX),
                snapshot,
            )
            .into_iter()
            .map(|link| link.genre_id)
            .collect())
    }

    // ------------------------------------------------------------------
    // Writes. Callers log the keys they touch in their transaction before
    // writing; undo of a key that was never written is a no-op.
    // ------------------------------------------------------------------

    pub fn next_movie_id(&self) -> MovieId {
        MovieId(Sequences::next(&self.sequences.movies))
    }

    pub fn next_detail_id(&self) -> MovieDetailId {
        MovieDetailId(Sequences::next(&self.sequences.details))
    }

    pub fn next_director_id(&self) -> DirectorId {
        DirectorId(Sequences::next(&self.sequences.directors))
    }

    pub fn next_genre_id(&self) -> GenreId {
        GenreId(Sequences::next(&self.sequences.genres))
    }

    pub async fn insert_movie(&self, movie: Movie, snapshot: &Snapshot) -> Result<()> {
        self.write(&self.movies).await?.insert(movie, snapshot)
    }

    pub async fn insert_detail(&self, detail: MovieDetail, snapshot: &Snapshot) -> Result<()> {
        self.write(&self.details).await?.insert(detail, snapshot)
    }

    pub async fn insert_director(&self, director: Director, snapshot: &Snapshot) -> Result<()> {
        self.write(&self.directors).await?.insert(director, snapshot)
    }

    pub async fn insert_genre(&self, genre: Genre, snapshot: &Snapshot) -> Result<()> {
        self.write(&self.genres).await?.insert(genre, snapshot)
    }

    /// Insert one link row per genre. Stops at the first failing row; rows
    /// written before it are returned through `touched` so they can be undone.
    pub async fn insert_genre_links(
        &self,
        movie_id: MovieId,
        genre_ids: &[GenreId],
        snapshot: &Snapshot,
        touched: &mut Vec<RowKey>,
    ) -> Result<()> {
        let mut table = self.write(&self.movie_genres).await?;
        for &genre_id in genre_ids {
            let link = MovieGenre { movie_id, genre_id };
            touched.push(RowKey::MovieGenre(movie_id, genre_id));
            table.insert(link, snapshot)?;
        }
        Ok(())
    }

    /// Delete every link row of a movie.
    pub async fn delete_genre_links(
        &self,
        movie_id: MovieId,
        snapshot: &Snapshot,
        touched: &mut Vec<RowKey>,
    ) -> Result<usize> {
        let mut table = self.write(&self.movie_genres).await?;
        let links = table.range(
            (movie_id, GenreId::MIN)..=(movie_id, GenreId::MAX),
            snapshot,
        );
        for link in &links {
            touched.push(RowKey::MovieGenre(link.movie_id, link.genre_id));
            table.delete(link.key(), snapshot)?;
        }
        Ok(links.len())
    }

    /// Returns `false` when the movie is not visible to `snapshot`.
    pub async fn update_movie(&self, movie: Movie, snapshot: &Snapshot) -> Result<bool> {
        self.write(&self.movies).await?.update(movie, snapshot)
    }

    pub async fn update_detail(&self, detail: MovieDetail, snapshot: &Snapshot) -> Result<bool> {
        self.write(&self.details).await?.update(detail, snapshot)
    }

    pub async fn delete_movie(&self, id: MovieId, snapshot: &Snapshot) -> Result<Option<Movie>> {
        self.write(&self.movies).await?.delete(id, snapshot)
    }

    pub async fn delete_detail(
        &self,
        id: MovieDetailId,
        snapshot: &Snapshot,
    ) -> Result<Option<MovieDetail>> {
        self.write(&self.details).await?.delete(id, snapshot)
    }

    /// Remove every version written by `tx_id` under `key`.
    ///
    /// Unlike the other writes this waits for the table lock without
    /// `lock_timeout`: a rollback that gave up on a busy table would leave
    /// the transaction's uncommitted versions in place and their keys
    /// locked against every later writer.
    pub async fn undo(&self, key: RowKey, tx_id: u64) -> Result<()> {
        match key {
            RowKey::Movie(id) => self.movies.write().await.undo(&id, tx_id),
            RowKey::MovieDetail(id) => self.details.write().await.undo(&id, tx_id),
            RowKey::Director(id) => self.directors.write().await.undo(&id, tx_id),
            RowKey::Genre(id) => self.genres.write().await.undo(&id, tx_id),
            RowKey::MovieGenre(movie, genre) => {
                self.movie_genres.write().await.undo(&(movie, genre), tx_id)
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshot restore
    // ------------------------------------------------------------------

    pub(crate) async fn restore_rows(
        &self,
        rows: StoreRows,
        xmin: u64,
    ) -> Result<()> {
        {
            let mut table = self.directors.write().await;
            for director in rows.directors {
                Sequences::bump_past(&self.sequences.directors, director.id.0);
                table.restore(director, xmin);
            }
        }
        {
            let mut table = self.genres.write().await;
            for genre in rows.genres {
                Sequences::bump_past(&self.sequences.genres, genre.id.0);
                table.restore(genre, xmin);
            }
        }
        {
            let mut table = self.details.write().await;
            for detail in rows.details {
                Sequences::bump_past(&self.sequences.details, detail.id.0);
                table.restore(detail, xmin);
            }
        }
        {
            let mut table = self.movies.write().await;
            for movie in rows.movies {
                Sequences::bump_past(&self.sequences.movies, movie.id.0);
                table.restore(movie, xmin);
            }
        }
        {
            let mut table = self.movie_genres.write().await;
            for link in rows.movie_genres {
                table.restore(link, xmin);
            }
        }
        Ok(())
    }

    pub(crate) async fn committed_rows(&self, snapshot: &Snapshot) -> Result<StoreRows> {
        Ok(StoreRows {
            movies: self.read(&self.movies).await?.scan(snapshot),
            details: self.read(&self.details).await?.scan(snapshot),
            directors: self.read(&self.directors).await?.scan(snapshot),
            genres: self.read(&self.genres).await?.scan(snapshot),
            movie_genres: self.read(&self.movie_genres).await?.scan(snapshot),
        })
    }

    /// Physical key counts, including keys whose versions are all dead.
    pub async fn table_stats(&self) -> TableStats {
        TableStats {
            movies: self.movies.read().await.key_count(),
            movie_details: self.details.read().await.key_count(),
            directors: self.directors.read().await.key_count(),
            genres: self.genres.read().await.key_count(),
            movie_genres: self.movie_genres.read().await.key_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub movies: usize,
    pub movie_details: usize,
    pub directors: usize,
    pub genres: usize,
    pub movie_genres: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
