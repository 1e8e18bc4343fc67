use std::env;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing_subscriber::EnvFilter;

use folio::{
    config::AppConfig,
    db,
    orphans::{self, DEFAULT_GRACE_MINUTES},
    s3,
    storage::S3Storage,
    store::PgStore,
};

const USAGE: &str = "Usage: maintenance prune-orphans [grace-minutes]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("prune-orphans") => {
            let raw = args.next();
            let minutes = raw.as_deref().map_or(Ok(DEFAULT_GRACE_MINUTES), str::parse::<i64>);
            let grace = minutes
                .ok()
                .filter(|minutes| *minutes >= 0)
                .and_then(Duration::try_minutes)
                .with_context(|| format!("invalid grace-minutes: {}", raw.unwrap_or_default()))?;
            prune_orphans(grace).await?
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Deletes stored image objects that no `images` row points at and that are
/// older than `grace`.
async fn prune_orphans(grace: Duration) -> Result<()> {
    let config = AppConfig::from_env()?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let storage_config = config
        .storage
        .as_ref()
        .context("S3_BUCKET and STORAGE_PUBLIC_URL must be set")?;

    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        s3_bucket = %storage_config.bucket,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(database_url, 1)?;
    let store = PgStore::new(pool);

    let s3_client = s3::build_client(storage_config).await?;
    let storage = S3Storage::new(
        s3_client,
        storage_config.bucket.clone(),
        storage_config.public_base_url.clone(),
    );

    let report = orphans::prune_orphans(&storage, &store, grace).await?;

    println!(
        "Deleted {} orphaned objects ({} stored, {} newer than {} minutes kept).",
        report.deleted.len(),
        report.stored,
        report.recent,
        grace.num_minutes()
    );

    if !report.failed.is_empty() {
        for key in &report.failed {
            eprintln!("Failed to delete object {key} from storage");
        }
        anyhow::bail!("{} objects could not be deleted", report.failed.len());
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
