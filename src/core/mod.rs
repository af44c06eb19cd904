pub mod error;
pub mod types;

pub use error::{CatalogError, ConflictReason, Result};
pub use types::{
    Director, DirectorId, EntityKind, Genre, GenreId, Movie, MovieAggregate, MovieDetail,
    MovieDetailId, MovieGenre, MovieId,
};
