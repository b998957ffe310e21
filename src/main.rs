use std::{net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Context as _, Result};
use clap::{Parser, Subcommand};
use redis::aio::MultiplexedConnection;
use serde::de::DeserializeOwned;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing_subscriber::EnvFilter;

use foodgram::{
    actions::{import_ingredients, import_tags, IngredientImport, TagImport},
    config::Config,
    rotate_catalog_cache,
    routes::{server, Context},
};

#[derive(Parser)]
#[command(name = "foodgram")]
#[command(about = "Foodgram recipe sharing backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Load ingredients from a JSON array of {name, measurement_unit}
    ImportIngredients {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Load tags from a JSON array of {name, slug}
    ImportTags {
        /// Path to the JSON file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().map_err(|e| anyhow!(e))?;

    let pool = connect_database(&config).await?;
    let cache = connect_cache(&config).await?;

    match cli.command {
        Commands::Serve => serve(pool, cache, config).await?,
        Commands::ImportIngredients { file } => {
            let items: Vec<IngredientImport> = read_json(&file).await?;
            let created = import_ingredients(items, &pool).await?;
            refresh_catalog(cache).await?;
            log::info!("Imported {created} new ingredients from {}", file.display());
        }
        Commands::ImportTags { file } => {
            let items: Vec<TagImport> = read_json(&file).await?;
            let created = import_tags(items, &pool).await?;
            refresh_catalog(cache).await?;
            log::info!("Imported {created} new tags from {}", file.display());
        }
    }

    Ok(())
}

async fn connect_database(config: &Config) -> Result<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

async fn connect_cache(config: &Config) -> Result<Option<MultiplexedConnection>> {
    let Some(url) = &config.redis_url else {
        log::info!("REDIS_URL not set, running without a cache");
        return Ok(None);
    };

    let client = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
    let connection = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to redis")?;

    Ok(Some(connection))
}

async fn refresh_catalog(cache: Option<MultiplexedConnection>) -> Result<()> {
    if let Some(mut cache) = cache {
        rotate_catalog_cache(&mut cache)
            .await
            .map_err(|e| anyhow!("Failed to invalidate the catalog cache: {e}"))?;
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(file: &PathBuf) -> Result<T> {
    let contents = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    serde_json::from_slice(&contents).with_context(|| format!("Malformed JSON in {}", file.display()))
}

async fn serve(
    pool: Pool<Postgres>,
    cache: Option<MultiplexedConnection>,
    config: Config,
) -> Result<()> {
    let address: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid BIND_ADDRESS {}", config.bind_address))?;

    tokio::fs::create_dir_all(&config.media_root)
        .await
        .context("Failed to create the media directory")?;

    log::info!("Listening on {address}");
    warp::serve(server(Context::new(pool, cache, config)))
        .run(address)
        .await;

    Ok(())
}
