use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cinedb::{
    Catalog, CatalogConfig, DirectorId, GenreId, MovieId, MovieOrder, MoviePatch, MovieQuery,
    NewMovie, Patch,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cinedb")]
#[command(about = "Transactional movie catalog", version)]
struct Cli {
    /// Snapshot file the catalog is loaded from and saved back to
    #[arg(long, global = true, env = "CINEDB_SNAPSHOT_PATH")]
    data: Option<PathBuf>,

    /// Match search patterns regardless of case
    #[arg(long, global = true)]
    case_insensitive: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Director {
        #[command(subcommand)]
        action: NamedAction,
    },
    Genre {
        #[command(subcommand)]
        action: NamedAction,
    },
    Movie {
        #[command(subcommand)]
        action: MovieAction,
    },
    /// Print table, pool and transaction counters
    Stats,
}

#[derive(Subcommand)]
enum NamedAction {
    Add { name: String },
    List,
}

#[derive(Subcommand)]
enum MovieAction {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        director: u64,
        #[arg(long = "genre")]
        genres: Vec<u64>,
    },
    Update {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        director: Option<u64>,
        /// Replace the genre set with these ids
        #[arg(long = "genre")]
        genres: Vec<u64>,
        /// Remove every genre from the movie
        #[arg(long, conflicts_with = "genres")]
        clear_genres: bool,
    },
    Delete {
        id: u64,
    },
    Get {
        id: u64,
    },
    Search {
        #[arg(long)]
        title: Option<String>,
        /// id, id-desc or title
        #[arg(long, default_value = "id")]
        order: MovieOrder,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
}

impl Command {
    fn mutates(&self) -> bool {
        match self {
            Command::Director { action } | Command::Genre { action } => {
                matches!(action, NamedAction::Add { .. })
            }
            Command::Movie { action } => matches!(
                action,
                MovieAction::Create { .. } | MovieAction::Update { .. } | MovieAction::Delete { .. }
            ),
            Command::Stats => false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = CatalogConfig::from_env().context("Invalid CINEDB_* configuration")?;
    if let Some(path) = &cli.data {
        config = config.snapshot_path(path);
    }
    if cli.case_insensitive {
        config = config.case_sensitive_search(false);
    }

    let catalog = Catalog::open(config)
        .await
        .context("Failed to open catalog")?;

    let mutates = cli.command.mutates();
    run(&catalog, cli.command).await?;

    if mutates && cli.data.is_some() {
        catalog
            .save_snapshot()
            .await
            .context("Failed to save catalog snapshot")?;
    }
    Ok(())
}

async fn run(catalog: &Catalog, command: Command) -> Result<()> {
    match command {
        Command::Director { action } => match action {
            NamedAction::Add { name } => print_json(&catalog.add_director(name).await?),
            NamedAction::List => print_json(&catalog.list_directors().await?),
        },
        Command::Genre { action } => match action {
            NamedAction::Add { name } => print_json(&catalog.add_genre(name).await?),
            NamedAction::List => print_json(&catalog.list_genres().await?),
        },
        Command::Movie { action } => run_movie(catalog, action).await,
        Command::Stats => print_json(&json!({
            "tables": catalog.table_stats().await,
            "pool": catalog.pool_stats().await,
            "transactions": {
                "committed": catalog.transaction_stats().committed,
                "aborted": catalog.transaction_stats().aborted,
            },
        })),
    }
}

async fn run_movie(catalog: &Catalog, action: MovieAction) -> Result<()> {
    match action {
        MovieAction::Create {
            title,
            description,
            director,
            genres,
        } => {
            let command = NewMovie::new(
                title,
                description,
                DirectorId(director),
                genres.into_iter().map(GenreId),
            );
            let id = catalog.create_movie(command).await?;
            print_json(&json!({ "id": id }))
        }
        MovieAction::Update {
            id,
            title,
            description,
            director,
            genres,
            clear_genres,
        } => {
            let patch = MoviePatch {
                title: Patch::from(title),
                description: Patch::from(description),
                director_id: Patch::from(director.map(DirectorId)),
                genre_ids: if clear_genres || !genres.is_empty() {
                    Patch::Set(genres.into_iter().map(GenreId).collect())
                } else {
                    Patch::Unset
                },
            };
            let id = catalog.update_movie(MovieId(id), patch).await?;
            print_json(&catalog.get_movie(id).await?)
        }
        MovieAction::Delete { id } => {
            let id = catalog.delete_movie(MovieId(id)).await?;
            print_json(&json!({ "deleted": id }))
        }
        MovieAction::Get { id } => print_json(&catalog.get_movie(MovieId(id)).await?),
        MovieAction::Search {
            title,
            order,
            offset,
            limit,
        } => {
            let query = MovieQuery {
                title,
                order,
                offset,
                limit,
            };
            print_json(&catalog.search_movies(query).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{}", rendered);
    Ok(())
}
