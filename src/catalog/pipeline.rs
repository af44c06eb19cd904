// ============================================================================
// Movie aggregate write pipeline
// ============================================================================
//
// Every mutation of the aggregate (movie row, its detail, its genre links)
// runs inside one coordinator transaction. References are resolved before
// the first write, so a bad director or genre id never leaves partial rows.

use super::commands::{MoviePatch, NewMovie, Patch};
use crate::connection::Tx;
use crate::core::{CatalogError, DirectorId, EntityKind, Genre, GenreId, MovieId, Result};
use crate::facade::TransactionCoordinator;
use crate::storage::EntityReader;
use tracing::{Instrument, Level, event, info_span};

#[derive(Clone)]
pub struct MovieWriter {
    coordinator: TransactionCoordinator,
}

impl MovieWriter {
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn create_movie(&self, command: NewMovie) -> Result<MovieId> {
        let span = info_span!(
            "catalog.movie.create",
            title = %command.title,
            director_id = %command.director_id
        );
        self.coordinator
            .with_transaction("create_movie", move |tx| create_in(tx, command))
            .instrument(span)
            .await
    }

    /// Apply `patch` to a movie. Unset fields keep their value; a set genre
    /// list replaces the whole genre set.
    pub async fn update_movie(&self, id: MovieId, patch: MoviePatch) -> Result<MovieId> {
        let span = info_span!("catalog.movie.update", movie_id = %id);
        self.coordinator
            .with_transaction("update_movie", move |tx| update_in(tx, id, patch))
            .instrument(span)
            .await
    }

    /// Delete a movie, its genre links and its detail.
    pub async fn delete_movie(&self, id: MovieId) -> Result<MovieId> {
        let span = info_span!("catalog.movie.delete", movie_id = %id);
        self.coordinator
            .with_transaction("delete_movie", move |tx| delete_in(tx, id))
            .instrument(span)
            .await
    }
}

async fn create_in(tx: Tx, command: NewMovie) -> Result<MovieId> {
    resolve_director(&tx, command.director_id).await?;
    let genres = resolve_genres(&tx, &command.genre_ids).await?;

    let detail = tx.insert_detail(command.description).await?;
    let movie = tx
        .insert_movie(command.title, detail.id, command.director_id)
        .await?;
    tx.add_genre_links(movie.id, &ids_of(&genres)).await?;

    event!(Level::INFO, movie_id = %movie.id, genres = genres.len(), "movie created");
    Ok(movie.id)
}

async fn update_in(tx: Tx, id: MovieId, patch: MoviePatch) -> Result<MovieId> {
    let movie = tx
        .movie(id)
        .await?
        .ok_or_else(|| CatalogError::not_found(EntityKind::Movie, id))?;
    let detail = tx
        .detail(movie.detail_id)
        .await?
        .ok_or_else(|| CatalogError::not_found(EntityKind::MovieDetail, movie.detail_id))?;

    if let Patch::Set(director_id) = &patch.director_id {
        resolve_director(&tx, *director_id).await?;
    }
    let genres = match &patch.genre_ids {
        Patch::Set(genre_ids) => Some(resolve_genres(&tx, genre_ids).await?),
        Patch::Unset => None,
    };

    // The movie row is rewritten on every update, so two concurrent updates
    // of one movie always collide on it.
    let mut next = movie;
    patch.title.apply_to(&mut next.title);
    patch.director_id.apply_to(&mut next.director_id);
    let next = tx.update_movie(next).await?;

    if let Patch::Set(description) = patch.description {
        let mut detail = detail;
        detail.description = description;
        tx.update_detail(detail).await?;
    }

    if let Some(genres) = genres {
        tx.replace_genre_links(id, &ids_of(&genres)).await?;
    }

    event!(Level::INFO, version = next.version, "movie updated");
    Ok(id)
}

async fn delete_in(tx: Tx, id: MovieId) -> Result<MovieId> {
    let movie = tx
        .movie(id)
        .await?
        .ok_or_else(|| CatalogError::not_found(EntityKind::Movie, id))?;

    // Removing the movie row also removes its genre links.
    tx.delete_movie(id).await?;
    if tx.delete_detail(movie.detail_id).await?.is_none() {
        event!(Level::WARN, detail_id = %movie.detail_id, "movie had no detail row");
    }

    event!(Level::INFO, "movie deleted");
    Ok(id)
}

async fn resolve_director(tx: &Tx, id: DirectorId) -> Result<()> {
    match tx.director(id).await? {
        Some(_) => Ok(()),
        None => Err(CatalogError::ReferenceNotFound {
            kind: EntityKind::Director,
            missing: vec![id.as_u64()],
            existing: Vec::new(),
        }),
    }
}

/// Load the distinct genres named by `requested`, failing with the ids that
/// do not exist.
async fn resolve_genres(tx: &Tx, requested: &[GenreId]) -> Result<Vec<Genre>> {
    let mut distinct = requested.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    let found = tx.genres(&distinct).await?;
    if found.len() < distinct.len() {
        let existing = ids_of(&found);
        let missing = distinct
            .iter()
            .filter(|id| !existing.contains(*id))
            .map(GenreId::as_u64)
            .collect();
        return Err(CatalogError::ReferenceNotFound {
            kind: EntityKind::Genre,
            missing,
            existing: existing.iter().map(GenreId::as_u64).collect(),
        });
    }
    Ok(found)
}

fn ids_of(genres: &[Genre]) -> Vec<GenreId> {
    genres.iter().map(|genre| genre.id).collect()
}
