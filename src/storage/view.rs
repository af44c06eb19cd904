use super::{InMemoryStore, Snapshot};
use crate::core::{
    Director, DirectorId, Genre, GenreId, Movie, MovieDetail, MovieDetailId, MovieId, Result,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Typed read access to the entity store as of some snapshot.
///
/// Implemented by [`ReadView`] for plain reads and by the transaction handle
/// for reads that must see the transaction's own writes.
#[async_trait]
pub trait EntityReader: Send + Sync {
    async fn movie(&self, id: MovieId) -> Result<Option<Movie>>;

    async fn detail(&self, id: MovieDetailId) -> Result<Option<MovieDetail>>;

    async fn director(&self, id: DirectorId) -> Result<Option<Director>>;

    /// Existing genres among `ids`, deduplicated and in id order.
    async fn genres(&self, ids: &[GenreId]) -> Result<Vec<Genre>>;

    /// Genre ids linked to a movie, in id order.
    async fn genre_ids_of(&self, movie_id: MovieId) -> Result<Vec<GenreId>>;

    /// All movies in id order whose title satisfies `filter`.
    async fn movies_where(
        &self,
        filter: &(dyn for<'m> Fn(&'m Movie) -> bool + Send + Sync),
    ) -> Result<Vec<Movie>>;
}

/// Non-transactional view over the committed state at one point in time.
#[derive(Clone)]
pub struct ReadView {
    store: Arc<InMemoryStore>,
    snapshot: Snapshot,
}

impl ReadView {
    pub fn new(store: Arc<InMemoryStore>, snapshot: Snapshot) -> Self {
        Self { store, snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

#[async_trait]
impl EntityReader for ReadView {
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
