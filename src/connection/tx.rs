use crate::core::{
    CatalogError, Director, DirectorId, EntityKind, Genre, GenreId, Movie, MovieDetail,
    MovieDetailId, MovieId, Result,
};
use crate::storage::{EntityReader, InMemoryStore, RowKey, Snapshot};
use crate::transaction::{Change, TransactionId, TransactionManager};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Handle to one open transaction.
///
/// Every write is logged in the transaction before it reaches the store, so
/// a rollback can undo it. The handle cannot begin, commit or roll back;
/// those belong to the connection that opened it.
#[derive(Clone)]
pub struct Tx {
    id: TransactionId,
    snapshot: Snapshot,
    store: Arc<InMemoryStore>,
    manager: Arc<TransactionManager>,
}

impl Tx {
    pub(crate) fn new(
        id: TransactionId,
        snapshot: Snapshot,
        store: Arc<InMemoryStore>,
        manager: Arc<TransactionManager>,
    ) -> Self {
        Self {
            id,
            snapshot,
            store,
            manager,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    async fn log(&self, change: Change) -> Result<()> {
        self.manager.record_change(self.id, change).await
    }

    async fn log_all(&self, keys: Vec<RowKey>, change: fn(RowKey) -> Change) -> Result<()> {
        self.manager
            .record_changes(self.id, keys.into_iter().map(change))
            .await
    }

    pub async fn insert_director(&self, name: impl Into<String>) -> Result<Director> {
        let director = Director {
            id: self.store.next_director_id(),
            name: name.into(),
        };
        self.log(Change::Insert(RowKey::Director(director.id))).await?;
        self.store
            .insert_director(director.clone(), &self.snapshot)
            .await?;
        Ok(director)
    }

    pub async fn insert_genre(&self, name: impl Into<String>) -> Result<Genre> {
        let genre = Genre {
            id: self.store.next_genre_id(),
            name: name.into(),
        };
        self.log(Change::Insert(RowKey::Genre(genre.id))).await?;
        self.store.insert_genre(genre.clone(), &self.snapshot).await?;
        Ok(genre)
    }

    pub async fn insert_detail(&self, description: impl Into<String>) -> Result<MovieDetail> {
        let detail = MovieDetail {
            id: self.store.next_detail_id(),
            description: description.into(),
        };
        self.log(Change::Insert(RowKey::MovieDetail(detail.id)))
            .await?;
        self.store.insert_detail(detail.clone(), &self.snapshot).await?;
        Ok(detail)
    }

    pub async fn insert_movie(
        &self,
        title: impl Into<String>,
        detail_id: MovieDetailId,
        director_id: DirectorId,
    ) -> Result<Movie> {
        let now = Utc::now();
        let movie = Movie {
            id: self.store.next_movie_id(),
            title: title.into(),
            detail_id,
            director_id,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.log(Change::Insert(RowKey::Movie(movie.id))).await?;
        self.store.insert_movie(movie.clone(), &self.snapshot).await?;
        Ok(movie)
    }

    /// Write a new version of a movie row, stamping `updated_at` and
    /// bumping `version`.
    pub async fn update_movie(&self, mut movie: Movie) -> Result<Movie> {
        movie.updated_at = Utc::now();
        movie.version += 1;
        self.log(Change::Update(RowKey::Movie(movie.id))).await?;
        if !self.store.update_movie(movie.clone(), &self.snapshot).await? {
            return Err(CatalogError::not_found(EntityKind::Movie, movie.id));
        }
        Ok(movie)
    }

    pub async fn update_detail(&self, detail: MovieDetail) -> Result<MovieDetail> {
        self.log(Change::Update(RowKey::MovieDetail(detail.id)))
            .await?;
        if !self.store.update_detail(detail.clone(), &self.snapshot).await? {
            return Err(CatalogError::not_found(EntityKind::MovieDetail, detail.id));
        }
        Ok(detail)
    }

    /// Delete a movie row together with all of its genre links.
    pub async fn delete_movie(&self, id: MovieId) -> Result<Movie> {
        self.log(Change::Delete(RowKey::Movie(id))).await?;
        let movie = self
            .store
            .delete_movie(id, &self.snapshot)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Movie, id))?;
        self.delete_genre_links(id).await?;
        Ok(movie)
    }

    pub async fn delete_detail(&self, id: MovieDetailId) -> Result<Option<MovieDetail>> {
        self.log(Change::Delete(RowKey::MovieDetail(id))).await?;
        self.store.delete_detail(id, &self.snapshot).await
    }

    pub async fn add_genre_links(&self, movie_id: MovieId, genre_ids: &[GenreId]) -> Result<()> {
        let mut touched = Vec::with_capacity(genre_ids.len());
        let result = self
            .store
            .insert_genre_links(movie_id, genre_ids, &self.snapshot, &mut touched)
            .await;
        self.log_all(touched, Change::Insert).await?;
        result
    }

    pub async fn delete_genre_links(&self, movie_id: MovieId) -> Result<usize> {
        let mut touched = Vec::new();
        let result = self
            .store
            .delete_genre_links(movie_id, &self.snapshot, &mut touched)
            .await;
        self.log_all(touched, Change::Delete).await?;
        result
    }

    /// Make the movie's genre set exactly `genre_ids`.
    pub async fn replace_genre_links(&self, movie_id: MovieId, genre_ids: &[GenreId]) -> Result<()> {
        self.delete_genre_links(movie_id).await?;
        self.add_genre_links(movie_id, genre_ids).await
    }
}

#[async_trait]
impl EntityReader for Tx {
    async fn movie(&self, id: MovieId) -> Result<Option<Movie>> {
        self.store.get_movie(id, &self.snapshot).await
    }

    async fn detail(&self, id: MovieDetailId) -> Result<Option<MovieDetail>> {
        self.store.get_detail(id, &self.snapshot).await
    }

    async fn director(&self, id: DirectorId) -> Result<Option<Director>> {
        self.store.get_director(id, &self.snapshot).await
    }

    async fn genres(&self, ids: &[GenreId]) -> Result<Vec<Genre>> {
        self.store.find_genres(ids, &self.snapshot).await
    }

    async fn genre_ids_of(&self, movie_id: MovieId) -> Result<Vec<GenreId>> {
        self.store.genre_links(movie_id, &self.snapshot).await
    }

    async fn movies_where(
        &self,
        filter: &(dyn for<'m> Fn(&'m Movie) -> bool + Send + Sync),
    ) -> Result<Vec<Movie>> {
        self.store.scan_movies(&self.snapshot, filter).await
    }
}
