// ============================================================================
// CineDB Library
// ============================================================================
//
// Movie catalog over an in-memory MVCC entity store. Every change to a movie
// aggregate (movie row, detail row, genre links) commits or rolls back as
// one transaction; reads see one consistent snapshot of committed data.

pub mod catalog;
pub mod connection;
pub mod core;
pub mod facade;
pub mod storage;
pub mod transaction;

pub use catalog::{
    MovieOrder, MoviePage, MoviePatch, MovieQuery, MovieReader, MovieWriter, NewMovie, Patch,
};
pub use connection::{CatalogConfig, Connection, ConnectionPool, PoolGuard, PoolStats, Tx};
pub use crate::core::{
    CatalogError, ConflictReason, Director, DirectorId, EntityKind, Genre, GenreId, Movie,
    MovieAggregate, MovieDetail, MovieDetailId, MovieGenre, MovieId, Result,
};
pub use facade::{Catalog, TransactionCoordinator};
pub use storage::{EntityReader, TableStats};
pub use transaction::{TransactionId, TransactionStats};
