use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const MIN: $name = $name(0);
            pub const MAX: $name = $name(u64::MAX);

            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

entity_id!(
    /// Store-assigned identifier of a movie.
    MovieId
);
entity_id!(
    /// Store-assigned identifier of a movie detail row.
    MovieDetailId
);
entity_id!(DirectorId);
entity_id!(GenreId);

/// The kinds of entity the catalog stores, used to label errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Movie,
    MovieDetail,
    Director,
    Genre,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Movie => "movie",
            EntityKind::MovieDetail => "movie detail",
            EntityKind::Director => "director",
            EntityKind::Genre => "genre",
        };
        f.write_str(label)
    }
}

/// A movie row. Relations are held as identifiers and resolved explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub detail_id: MovieDetailId,
    pub director_id: DirectorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1 and grows by one on every update.
    pub version: u64,
}

/// Owned 1:1 by exactly one movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub id: MovieDetailId,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Director {
    pub id: DirectorId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}

/// One row of the movie <-> genre link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovieGenre {
    pub movie_id: MovieId,
    pub genre_id: GenreId,
}

/// A movie with its detail, director and genre set resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieAggregate {
    pub id: MovieId,
    pub title: String,
    pub detail: MovieDetail,
    pub director: Director,
    /// Sorted by genre id.
    pub genres: Vec<Genre>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl MovieAggregate {
    pub fn genre_ids(&self) -> Vec<GenreId> {
        self.genres.iter().map(|genre| genre.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_conversion() {
        let id = MovieId::from(10);
        assert_eq!(id.to_string(), "10");
        assert_eq!(u64::from(id), 10);
        assert!(MovieId::MIN < id && id < MovieId::MAX);
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let link = MovieGenre {
            movie_id: MovieId(1),
            genre_id: GenreId(2),
        };
        let json = serde_json::to_string(&link).unwrap();
        assert_eq!(json, r#"{"movie_id":1,"genre_id":2}"#);
    }
}
