use crate::core::{
    CatalogError, Director, DirectorId, Genre, GenreId, Movie, MovieDetail, MovieDetailId,
    MovieGenre, MovieId, Result,
};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;

/// Point-in-time view used to decide which row versions a reader sees.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Transaction owning this snapshot; its own writes are always visible.
    pub tx_id: u64,
    /// Transactions still running when the snapshot was taken.
    pub active: Arc<HashSet<u64>>,
    /// Transactions with an id at or above this started after the snapshot.
    pub max_tx_id: u64,
}

impl Snapshot {
    pub fn is_committed(&self, tx_id: u64) -> bool {
        tx_id < self.max_tx_id && !self.active.contains(&tx_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    Movies,
    MovieDetails,
    Directors,
    Genres,
    MovieGenres,
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableName::Movies => "movies",
            TableName::MovieDetails => "movie_details",
            TableName::Directors => "directors",
            TableName::Genres => "genres",
            TableName::MovieGenres => "movie_genres",
        };
        f.write_str(name)
    }
}

/// Primary key of any stored row, tagged with its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKey {
    Movie(MovieId),
    MovieDetail(MovieDetailId),
    Director(DirectorId),
    Genre(GenreId),
    MovieGenre(MovieId, GenreId),
}

impl RowKey {
    pub fn table(&self) -> TableName {
        match self {
            RowKey::Movie(_) => TableName::Movies,
            RowKey::MovieDetail(_) => TableName::MovieDetails,
            RowKey::Director(_) => TableName::Directors,
            RowKey::Genre(_) => TableName::Genres,
            RowKey::MovieGenre(..) => TableName::MovieGenres,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Movie(id) => write!(f, "movies[{}]", id),
            RowKey::MovieDetail(id) => write!(f, "movie_details[{}]", id),
            RowKey::Director(id) => write!(f, "directors[{}]", id),
            RowKey::Genre(id) => write!(f, "genres[{}]", id),
            RowKey::MovieGenre(movie, genre) => write!(f, "movie_genres[{},{}]", movie, genre),
        }
    }
}

/// A row type that can live in a [`Table`].
pub trait Record: Clone + Send + Sync + 'static {
    type Key: Copy + Ord + fmt::Debug + Send + Sync + 'static;

    const TABLE: TableName;

    fn key(&self) -> Self::Key;

    fn row_key(key: Self::Key) -> RowKey;
}

impl Record for Movie {
    type Key = MovieId;
    const TABLE: TableName = TableName::Movies;

    fn key(&self) -> MovieId {
        self.id
    }

    fn row_key(key: MovieId) -> RowKey {
        RowKey::Movie(key)
    }
}

impl Record for MovieDetail {
    type Key = MovieDetailId;
    const TABLE: TableName = TableName::MovieDetails;

    fn key(&self) -> MovieDetailId {
        self.id
    }

    fn row_key(key: MovieDetailId) -> RowKey {
        RowKey::MovieDetail(key)
    }
}

impl Record for Director {
    type Key = DirectorId;
    const TABLE: TableName = TableName::Directors;

    fn key(&self) -> DirectorId {
        self.id
    }

    fn row_key(key: DirectorId) -> RowKey {
        RowKey::Director(key)
    }
}

impl Record for Genre {
    type Key = GenreId;
    const TABLE: TableName = TableName::Genres;

    fn key(&self) -> GenreId {
        self.id
    }

    fn row_key(key: GenreId) -> RowKey {
        RowKey::Genre(key)
    }
}

impl Record for MovieGenre {
    type Key = (MovieId, GenreId);
    const TABLE: TableName = TableName::MovieGenres;

    fn key(&self) -> (MovieId, GenreId) {
        (self.movie_id, self.genre_id)
    }

    fn row_key((movie, genre): (MovieId, GenreId)) -> RowKey {
        RowKey::MovieGenre(movie, genre)
    }
}

#[derive(Debug, Clone)]
pub struct MvccRow<R> {
    pub record: R,
    pub xmin: u64,         // Transaction that created this version
    pub xmax: Option<u64>, // Transaction that deleted/replaced this version
}

/// MVCC table keyed by primary key. Iteration follows key order.
#[derive(Debug, Clone)]
pub struct Table<R: Record> {
    rows: BTreeMap<R::Key, Vec<MvccRow<R>>>,
}

impl<R: Record> Default for Table<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Table<R> {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }

    /// Insert a new row. A key that already has a live version is rejected.
    pub fn insert(&mut self, record: R, snapshot: &Snapshot) -> Result<()> {
        let key = record.key();
        let versions = self.rows.entry(key).or_default();

        if let Some(latest) = versions.last() {
            match latest.xmax {
                None => {
                    if latest.xmin == snapshot.tx_id || snapshot.is_committed(latest.xmin) {
                        return Err(CatalogError::ConstraintViolation(format!(
                            "Unique constraint violation: {} already exists",
                            R::row_key(key)
                        )));
                    }
                    return Err(conflict(R::row_key(key)));
                }
                Some(xmax) if xmax == snapshot.tx_id || snapshot.is_committed(xmax) => {}
                Some(_) => return Err(conflict(R::row_key(key))),
            }
        }

        versions.push(MvccRow {
            record,
            xmin: snapshot.tx_id,
            xmax: None,
        });
        Ok(())
    }

    /// Replace the visible version of a row. Returns `false` when no such row
    /// is visible.
    pub fn update(&mut self, record: R, snapshot: &Snapshot) -> Result<bool> {
        let key = record.key();
        let Some(versions) = self.rows.get_mut(&key) else {
            return Ok(false);
        };
        let Some(latest) = versions.last_mut() else {
            return Ok(false);
        };
        if !Self::check_writable(latest, key, snapshot)? {
            return Ok(false);
        }

        if latest.xmin == snapshot.tx_id {
            latest.record = record;
        } else {
            latest.xmax = Some(snapshot.tx_id);
            versions.push(MvccRow {
                record,
                xmin: snapshot.tx_id,
                xmax: None,
            });
        }
        Ok(true)
    }

    /// Mark the visible version of a row deleted and return it.
    pub fn delete(&mut self, key: R::Key, snapshot: &Snapshot) -> Result<Option<R>> {
        let Some(latest) = self.rows.get_mut(&key).and_then(|versions| versions.last_mut()) else {
            return Ok(None);
        };
        if !Self::check_writable(latest, key, snapshot)? {
            return Ok(None);
        }
        latest.xmax = Some(snapshot.tx_id);
        Ok(Some(latest.record.clone()))
    }

    /// First updater wins: a row touched by a transaction that is not
    /// committed as of `snapshot` cannot be written.
    fn check_writable(latest: &MvccRow<R>, key: R::Key, snapshot: &Snapshot) -> Result<bool> {
        let me = snapshot.tx_id;
        if latest.xmin != me && !snapshot.is_committed(latest.xmin) {
            return Err(conflict(R::row_key(key)));
        }
        match latest.xmax {
            None => Ok(true),
            Some(xmax) if xmax == me || snapshot.is_committed(xmax) => Ok(false),
            Some(_) => Err(conflict(R::row_key(key))),
        }
    }

    pub fn get(&self, key: &R::Key, snapshot: &Snapshot) -> Option<R> {
        self.rows
            .get(key)
            .and_then(|versions| Self::visible_version(versions, snapshot))
    }

    pub fn scan(&self, snapshot: &Snapshot) -> Vec<R> {
        self.rows
            .values()
            .filter_map(|versions| Self::visible_version(versions, snapshot))
            .collect()
    }

    pub fn range<B>(&self, bounds: B, snapshot: &Snapshot) -> Vec<R>
    where
        B: RangeBounds<R::Key>,
    {
        self.rows
            .range(bounds)
            .filter_map(|(_, versions)| Self::visible_version(versions, snapshot))
            .collect()
    }

    /// Drop every version created by `tx_id` and revive every version it
    /// deleted. Safe to call more than once.
    pub fn undo(&mut self, key: &R::Key, tx_id: u64) {
        let Some(versions) = self.rows.get_mut(key) else {
            return;
        };
        versions.retain(|version| version.xmin != tx_id);
        for version in versions.iter_mut() {
            if version.xmax == Some(tx_id) {
                version.xmax = None;
            }
        }
        if versions.is_empty() {
            self.rows.remove(key);
        }
    }

    /// Number of keys holding at least one version.
    pub fn key_count(&self) -> usize {
        self.rows.len()
    }

    /// Restore a committed row loaded from a snapshot file.
    pub(crate) fn restore(&mut self, record: R, xmin: u64) {
        self.rows.insert(
            record.key(),
            vec![MvccRow {
                record,
                xmin,
                xmax: None,
            }],
        );
    }

    fn visible_version(versions: &[MvccRow<R>], snapshot: &Snapshot) -> Option<R> {
        versions
            .iter()
            .rev()
            .find(|version| Self::is_visible(version, snapshot))
            .map(|version| version.record.clone())
    }

    fn is_visible(row: &MvccRow<R>, snapshot: &Snapshot) -> bool {
        if row.xmin == snapshot.tx_id {
            return row.xmax != Some(snapshot.tx_id);
        }

        if !snapshot.is_committed(row.xmin) {
            return false;
        }

        match row.xmax {
            Some(xmax) if xmax == snapshot.tx_id => false,
            Some(xmax) => !snapshot.is_committed(xmax),
            None => true,
        }
    }
}

fn conflict(key: RowKey) -> CatalogError {
    CatalogError::write_conflict(format!("{} is being modified by another transaction", key))
}
