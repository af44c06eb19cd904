use crate::core::{CatalogError, EntityKind, Movie, MovieAggregate, MovieId, Result};
use crate::storage::{EntityReader, InMemoryStore, ReadView};
use crate::transaction::TransactionManager;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Result order of [`MovieReader::search_movies`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovieOrder {
    /// Identifier order, which is also insertion order.
    #[default]
    IdAsc,
    IdDesc,
    /// Title order, ties broken by identifier.
    TitleAsc,
}

impl FromStr for MovieOrder {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "id" | "id-asc" => Ok(MovieOrder::IdAsc),
            "id-desc" => Ok(MovieOrder::IdDesc),
            "title" | "title-asc" => Ok(MovieOrder::TitleAsc),
            other => Err(CatalogError::Config(format!(
                "unknown movie order '{}' (expected id, id-desc or title)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieQuery {
    /// Substring the title must contain. `None` matches every movie.
    pub title: Option<String>,
    pub order: MovieOrder,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl MovieQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn title(pattern: impl Into<String>) -> Self {
        Self {
            title: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn order(mut self, order: MovieOrder) -> Self {
        self.order = order;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of search results. `total` counts every match, not just the
/// ones on this page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoviePage {
    pub items: Vec<MovieAggregate>,
    pub total: usize,
}

struct TitleMatcher {
    pattern: Option<String>,
    case_sensitive: bool,
}

impl TitleMatcher {
    fn new(pattern: Option<&str>, case_sensitive: bool) -> Self {
        let pattern = pattern.map(|p| {
            if case_sensitive {
                p.to_string()
            } else {
                p.to_lowercase()
            }
        });
        Self {
            pattern,
            case_sensitive,
        }
    }

    fn matches(&self, title: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) if self.case_sensitive => title.contains(pattern.as_str()),
            Some(pattern) => title.to_lowercase().contains(pattern.as_str()),
        }
    }
}

/// Join a movie row with its detail, director and genres.
pub async fn hydrate<R>(reader: &R, movie: Movie) -> Result<MovieAggregate>
where
    R: EntityReader + ?Sized,
{
    let detail = reader
        .detail(movie.detail_id)
        .await?
        .ok_or_else(|| CatalogError::not_found(EntityKind::MovieDetail, movie.detail_id))?;
    let director = reader
        .director(movie.director_id)
        .await?
        .ok_or_else(|| CatalogError::not_found(EntityKind::Director, movie.director_id))?;
    let genre_ids = reader.genre_ids_of(movie.id).await?;
    let genres = reader.genres(&genre_ids).await?;

    Ok(MovieAggregate {
        id: movie.id,
        title: movie.title,
        detail,
        director,
        genres,
        created_at: movie.created_at,
        updated_at: movie.updated_at,
        version: movie.version,
    })
}

/// Read side of the catalog. Every call reads one consistent snapshot of
/// committed data and opens no transaction.
#[derive(Clone)]
pub struct MovieReader {
    store: Arc<InMemoryStore>,
    manager: Arc<TransactionManager>,
    case_sensitive: bool,
}

impl MovieReader {
    pub fn new(
        store: Arc<InMemoryStore>,
        manager: Arc<TransactionManager>,
        case_sensitive: bool,
    ) -> Self {
        Self {
            store,
            manager,
            case_sensitive,
        }
    }

    async fn view(&self) -> ReadView {
        ReadView::new(Arc::clone(&self.store), self.manager.read_snapshot().await)
    }

    pub async fn get_movie(&self, id: MovieId) -> Result<MovieAggregate> {
        let view = self.view().await;
        let movie = view
            .movie(id)
            .await?
            .ok_or_else(|| CatalogError::not_found(EntityKind::Movie, id))?;
        hydrate(&view, movie).await
    }

    pub async fn search_movies(&self, query: MovieQuery) -> Result<MoviePage> {
        let span = info_span!(
            "catalog.movie.search",
            title = query.title.as_deref().unwrap_or(""),
            offset = query.offset
        );
        async move {
            let view = self.view().await;
            let matcher = TitleMatcher::new(query.title.as_deref(), self.case_sensitive);
            let mut movies = view
                .movies_where(&|movie: &Movie| matcher.matches(&movie.title))
                .await?;
            let total = movies.len();

            match query.order {
                MovieOrder::IdAsc => {}
                MovieOrder::IdDesc => movies.reverse(),
                MovieOrder::TitleAsc => {
                    movies.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)))
                }
            }

            let mut items = Vec::new();
            for movie in movies
                .into_iter()
                .skip(query.offset)
                .take(query.limit.unwrap_or(usize::MAX))
            {
                items.push(hydrate(&view, movie).await?);
            }

            event!(Level::DEBUG, total, returned = items.len(), "movie search done");
            Ok(MoviePage { items, total })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_matcher_case_sensitive() {
        let matcher = TitleMatcher::new(Some("cep"), true);
        assert!(matcher.matches("Inception"));
        assert!(!matcher.matches("INCEPTION"));
    }

    #[test]
    fn test_title_matcher_case_insensitive() {
        let matcher = TitleMatcher::new(Some("CEP"), false);
        assert!(matcher.matches("Inception"));
        assert!(!matcher.matches("Interstellar"));
    }

    #[test]
    fn test_title_matcher_without_pattern_matches_all() {
        let matcher = TitleMatcher::new(None, true);
        assert!(matcher.matches(""));
        assert!(matcher.matches("Memento"));
    }

    #[test]
    fn test_movie_order_parsing() {
        assert_eq!("id".parse::<MovieOrder>().unwrap(), MovieOrder::IdAsc);
        assert_eq!("ID-DESC".parse::<MovieOrder>().unwrap(), MovieOrder::IdDesc);
        assert_eq!("title".parse::<MovieOrder>().unwrap(), MovieOrder::TitleAsc);
        assert!("rating".parse::<MovieOrder>().is_err());
    }

    #[test]
    fn test_query_builder() {
        let query = MovieQuery::title("In").order(MovieOrder::TitleAsc).offset(2).limit(5);
        assert_eq!(query.title.as_deref(), Some("In"));
        assert_eq!(query.offset, 2);
        assert_eq!(query.limit, Some(5));
    }
}
