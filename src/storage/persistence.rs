//! Snapshot files for the entity store.
//!
//! A snapshot holds only committed rows. It is written to a temporary file
//! in the target directory and renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.

use crate::core::{CatalogError, Director, Genre, Movie, MovieDetail, MovieGenre, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreRows {
    pub movies: Vec<Movie>,
    pub details: Vec<MovieDetail>,
    pub directors: Vec<Director>,
    pub genres: Vec<Genre>,
    pub movie_genres: Vec<MovieGenre>,
}

impl StoreRows {
    pub fn row_count(&self) -> usize {
        self.movies.len()
            + self.details.len()
            + self.directors.len()
            + self.genres.len()
            + self.movie_genres.len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub rows: StoreRows,
}

impl StoreSnapshot {
    pub fn new(rows: StoreRows) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            rows,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dir = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            CatalogError::Persistence(format!("Failed to create snapshot directory: {}", e))
        })?;

        let serialized = rmp_serde::to_vec_named(snapshot).map_err(|e| {
            CatalogError::Persistence(format!("Failed to serialize snapshot: {}", e))
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| CatalogError::Persistence(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| CatalogError::Persistence(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| CatalogError::Persistence(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path).map_err(|e| {
            CatalogError::Persistence(format!("Failed to move snapshot into place: {}", e))
        })?;
        Ok(())
    }

    /// Load the snapshot, or `None` when no file exists yet.
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.snapshot_path)
            .map_err(|e| CatalogError::Persistence(format!("Failed to open snapshot: {}", e)))?;
        let snapshot: StoreSnapshot = rmp_serde::from_read(BufReader::new(file)).map_err(|e| {
            CatalogError::Persistence(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(CatalogError::Persistence(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DirectorId, GenreId, MovieDetailId, MovieId};

    fn sample_rows() -> StoreRows {
        let now = Utc::now();
        StoreRows {
            movies: vec![Movie {
                id: MovieId(1),
                title: "Inception".into(),
                detail_id: MovieDetailId(1),
                director_id: DirectorId(1),
                created_at: now,
                updated_at: now,
                version: 1,
            }],
            details: vec![MovieDetail {
                id: MovieDetailId(1),
                description: "dream heist".into(),
            }],
            directors: vec![Director {
                id: DirectorId(1),
                name: "Christopher Nolan".into(),
            }],
            genres: vec![Genre {
                id: GenreId(2),
                name: "Sci-Fi".into(),
            }],
            movie_genres: vec![MovieGenre {
                movie_id: MovieId(1),
                genre_id: GenreId(2),
            }],
        }
    }

    #[test]
    fn test_missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().join("catalog.snap"));
        assert!(manager.load().unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path().join("nested").join("catalog.snap"));

        let rows = sample_rows();
        manager.save(&StoreSnapshot::new(StoreRows::default())).unwrap();
        manager.save(&StoreSnapshot::new(rows.clone())).unwrap();

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.rows, rows);
        assert_eq!(loaded.rows.row_count(), 5);

        // Only the snapshot itself remains; the temp file was renamed.
        let entries = fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.snap");
        fs::write(&path, b"not a snapshot").unwrap();

        let err = SnapshotManager::new(&path).load().unwrap_err();
        assert!(matches!(err, CatalogError::Persistence(_)));
    }
}
