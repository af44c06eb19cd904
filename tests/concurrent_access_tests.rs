/// Concurrent access tests
///
/// Parallel creates, conflicting writers, readers during writes and
/// abandoned callers
/// Run with: cargo test --test concurrent_access_tests

use cinedb::{
    Catalog, CatalogConfig, CatalogError, ConflictReason, DirectorId, EntityKind, EntityReader,
    GenreId, MovieId, MoviePatch, MovieQuery, NewMovie,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

async fn seeded_catalog(config: CatalogConfig) -> Catalog {
    let catalog = Catalog::open(config).await.unwrap();
    catalog.add_director("Christopher Nolan").await.unwrap();
    catalog.add_genre("Sci-Fi").await.unwrap();
    catalog.add_genre("Thriller").await.unwrap();
    catalog
}

async fn create(catalog: &Catalog, title: &str) -> MovieId {
    catalog
        .create_movie(NewMovie::new(title, "plot", DirectorId(1), [GenreId(1)]))
        .await
        .unwrap()
}

/// Open a transaction that rewrites the movie row and keeps it uncommitted
/// until `release` fires.
async fn hold_movie_row(
    catalog: &Catalog,
    id: MovieId,
    title: &'static str,
) -> (oneshot::Sender<()>, JoinHandle<cinedb::Result<()>>) {
    let (locked_tx, locked_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let coordinator = catalog.coordinator().clone();

    let holder = tokio::spawn(async move {
        coordinator
            .with_transaction("hold", move |tx| async move {
                let mut movie = tx
                    .movie(id)
                    .await?
                    .ok_or_else(|| CatalogError::not_found(EntityKind::Movie, id))?;
                movie.title = title.to_string();
                tx.update_movie(movie).await?;
                let _ = locked_tx.send(());
                let _ = release_rx.await;
                Ok::<_, CatalogError>(())
            })
            .await
    });

    locked_rx.await.unwrap();
    (release_tx, holder)
}

#[tokio::test]
async fn test_concurrent_creates() {
    let catalog = Arc::new(seeded_catalog(CatalogConfig::new().max_connections(4)).await);

    let mut handles = vec![];
    for task_id in 0..20 {
        let catalog = Arc::clone(&catalog);
        handles.push(tokio::spawn(async move {
            catalog
                .create_movie(NewMovie::new(
                    format!("Movie {}", task_id),
                    "plot",
                    DirectorId(1),
                    [GenreId(1), GenreId(2)],
                ))
                .await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }
    assert_eq!(ids.len(), 20);

    let page = catalog.search_movies(MovieQuery::all()).await.unwrap();
    assert_eq!(page.total, 20);
    assert!(page.items.iter().all(|movie| movie.genres.len() == 2));
    assert_eq!(catalog.table_stats().await.movie_genres, 40);
}

#[tokio::test]
async fn test_conflicting_update_is_retryable() {
    let catalog = seeded_catalog(CatalogConfig::new()).await;
    let id = create(&catalog, "Inception").await;

    let (release, holder) = hold_movie_row(&catalog, id, "Held").await;

    let err = catalog
        .update_movie(id, MoviePatch::new().title("Stale"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::ConflictOrTimeout {
            reason: ConflictReason::WriteConflict,
            ..
        }
    ));
    assert!(err.is_retryable());

    release.send(()).unwrap();
    holder.await.unwrap().unwrap();

    // The first writer won; a retry now applies on top of its change.
    assert_eq!(catalog.get_movie(id).await.unwrap().title, "Held");
    catalog
        .update_movie(id, MoviePatch::new().description("retried"))
        .await
        .unwrap();
    let movie = catalog.get_movie(id).await.unwrap();
    assert_eq!(movie.title, "Held");
    assert_eq!(movie.detail.description, "retried");
    assert_eq!(movie.version, 3);
}

#[tokio::test]
async fn test_description_only_update_still_conflicts() {
    let catalog = seeded_catalog(CatalogConfig::new()).await;
    let id = create(&catalog, "Inception").await;

    let (release, holder) = hold_movie_row(&catalog, id, "Held").await;

    let err = catalog
        .update_movie(id, MoviePatch::new().description("stale"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    release.send(()).unwrap();
    holder.await.unwrap().unwrap();
    assert_eq!(catalog.get_movie(id).await.unwrap().detail.description, "plot");
}

#[tokio::test]
async fn test_delete_conflicts_with_open_update() {
    let catalog = seeded_catalog(CatalogConfig::new()).await;
    let id = create(&catalog, "Inception").await;

    let (release, holder) = hold_movie_row(&catalog, id, "Held").await;

    let err = catalog.delete_movie(id).await.unwrap_err();
    assert!(err.is_retryable());

    release.send(()).unwrap();
    holder.await.unwrap().unwrap();

    // Nothing of the failed delete survives.
    let movie = catalog.get_movie(id).await.unwrap();
    assert_eq!(movie.genre_ids(), vec![GenreId(1)]);
    assert_eq!(movie.detail.description, "plot");
}

#[tokio::test]
async fn test_readers_see_committed_state_during_write() {
    let catalog = seeded_catalog(CatalogConfig::new()).await;
    let id = create(&catalog, "Inception").await;

    let (release, holder) = hold_movie_row(&catalog, id, "Uncommitted").await;

    let during = tokio::time::timeout(Duration::from_secs(1), catalog.get_movie(id))
        .await
        .expect("reader blocked by writer")
        .unwrap();
    assert_eq!(during.title, "Inception");
    let found = catalog
        .search_movies(MovieQuery::title("Uncommitted"))
        .await
        .unwrap();
    assert_eq!(found.total, 0);

    release.send(()).unwrap();
    holder.await.unwrap().unwrap();
    assert_eq!(catalog.get_movie(id).await.unwrap().title, "Uncommitted");
}

#[tokio::test]
async fn test_pool_exhaustion_times_out() {
    let catalog = seeded_catalog(
        CatalogConfig::new()
            .max_connections(1)
            .connect_timeout(Duration::from_millis(50)),
    )
    .await;
    let id = create(&catalog, "Inception").await;

    let (release, holder) = hold_movie_row(&catalog, id, "Held").await;

    let err = catalog
        .create_movie(NewMovie::new("Tenet", "plot", DirectorId(1), []))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::ConflictOrTimeout {
            reason: ConflictReason::PoolTimeout,
            ..
        }
    ));

    release.send(()).unwrap();
    holder.await.unwrap().unwrap();
    catalog
        .create_movie(NewMovie::new("Tenet", "plot", DirectorId(1), []))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_abandoned_caller_still_commits_aggregate() {
    let catalog = Arc::new(seeded_catalog(CatalogConfig::new()).await);
    let (started_tx, started_rx) = oneshot::channel();

    let caller = {
        let coordinator = catalog.coordinator().clone();
        tokio::spawn(async move {
            coordinator
                .with_transaction("create_movie", move |tx| async move {
                    let _ = started_tx.send(());
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let detail = tx.insert_detail("plot").await?;
                    let movie = tx.insert_movie("Abandoned", detail.id, DirectorId(1)).await?;
                    tx.add_genre_links(movie.id, &[GenreId(2)]).await?;
                    Ok::<_, CatalogError>(movie.id)
                })
                .await
        })
    };
    started_rx.await.unwrap();
    caller.abort();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(catalog.pool_stats().await.active_connections, 0);
    let page = catalog.search_movies(MovieQuery::all()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Abandoned");
    assert_eq!(page.items[0].detail.description, "plot");
    assert_eq!(page.items[0].genre_ids(), vec![GenreId(2)]);
}

#[tokio::test]
async fn test_abandoned_caller_still_rolls_back_failed_work() {
    let catalog = Arc::new(seeded_catalog(CatalogConfig::new()).await);
    let (started_tx, started_rx) = oneshot::channel();

    let caller = {
        let coordinator = catalog.coordinator().clone();
        tokio::spawn(async move {
            coordinator
                .with_transaction("create_movie", move |tx| async move {
                    let detail = tx.insert_detail("plot").await?;
                    let _ = started_tx.send(());
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    tx.insert_movie("Abandoned", detail.id, DirectorId(1)).await?;
                    Err::<(), _>(CatalogError::ConstraintViolation("late failure".into()))
                })
                .await
        })
    };
    started_rx.await.unwrap();
    caller.abort();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(catalog.pool_stats().await.active_connections, 0);
    assert_eq!(catalog.transaction_stats().aborted, 1);
    let stats = catalog.table_stats().await;
    assert_eq!(stats.movies, 0);
    assert_eq!(stats.movie_details, 0);
}
