/// Search tests
///
/// Title search, ordering and pagination of the aggregate reader
/// Run with: cargo test --test search_tests

use cinedb::{Catalog, CatalogConfig, DirectorId, GenreId, MovieOrder, MovieQuery, NewMovie};

const TITLES: [&str; 4] = ["Interstellar", "Inception", "The Prestige", "Memento"];

async fn catalog_with_movies(config: CatalogConfig) -> Catalog {
    let catalog = Catalog::open(config).await.unwrap();
    catalog.add_director("Christopher Nolan").await.unwrap();
    catalog.add_genre("Sci-Fi").await.unwrap();
    for title in TITLES {
        catalog
            .create_movie(NewMovie::new(title, "plot", DirectorId(1), [GenreId(1)]))
            .await
            .unwrap();
    }
    catalog
}

fn titles(page: &cinedb::MoviePage) -> Vec<&str> {
    page.items.iter().map(|movie| movie.title.as_str()).collect()
}

#[tokio::test]
async fn test_search_without_pattern_returns_all_in_id_order() {
    let catalog = catalog_with_movies(CatalogConfig::new()).await;

    let page = catalog.search_movies(MovieQuery::all()).await.unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(titles(&page), TITLES.to_vec());
    assert!(page.items.iter().all(|movie| movie.director.id == DirectorId(1)));
    assert!(page.items.iter().all(|movie| movie.genre_ids() == vec![GenreId(1)]));
}

#[tokio::test]
async fn test_search_is_case_sensitive_by_default() {
    let catalog = catalog_with_movies(CatalogConfig::new()).await;

    let page = catalog.search_movies(MovieQuery::title("In")).await.unwrap();
    assert_eq!(titles(&page), vec!["Interstellar", "Inception"]);

    let page = catalog.search_movies(MovieQuery::title("in")).await.unwrap();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_search_case_insensitive() {
    let catalog = catalog_with_movies(CatalogConfig::new().case_sensitive_search(false)).await;

    let page = catalog.search_movies(MovieQuery::title("in")).await.unwrap();
    assert_eq!(page.total, 2);

    let page = catalog.search_movies(MovieQuery::title("PRESTIGE")).await.unwrap();
    assert_eq!(titles(&page), vec!["The Prestige"]);
}

#[tokio::test]
async fn test_search_ordering() {
    let catalog = catalog_with_movies(CatalogConfig::new()).await;

    let page = catalog
        .search_movies(MovieQuery::all().order(MovieOrder::TitleAsc))
        .await
        .unwrap();
    assert_eq!(
        titles(&page),
        vec!["Inception", "Interstellar", "Memento", "The Prestige"]
    );

    let page = catalog
        .search_movies(MovieQuery::all().order(MovieOrder::IdDesc))
        .await
        .unwrap();
    assert_eq!(
        titles(&page),
        vec!["Memento", "The Prestige", "Inception", "Interstellar"]
    );
}

#[tokio::test]
async fn test_search_pagination_keeps_total() {
    let catalog = catalog_with_movies(CatalogConfig::new()).await;

    let page = catalog
        .search_movies(
            MovieQuery::all()
                .order(MovieOrder::TitleAsc)
                .offset(1)
                .limit(2),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(titles(&page), vec!["Interstellar", "Memento"]);

    let page = catalog
        .search_movies(MovieQuery::all().offset(10))
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_search_is_stable_across_calls() {
    let catalog = catalog_with_movies(CatalogConfig::new()).await;

    let first = catalog.search_movies(MovieQuery::title("e")).await.unwrap();
    let second = catalog.search_movies(MovieQuery::title("e")).await.unwrap();
    assert_eq!(first, second);
}
