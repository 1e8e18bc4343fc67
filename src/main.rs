use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use folio::{
    access::EmailClaimant,
    auth::{JwtVerifier, RemoteVerifier, TokenVerifier},
    config::{AppConfig, AuthConfig},
    db,
    routes::{create_router, create_unconfigured_router},
    s3::build_client,
    state::AppState,
    storage::S3Storage,
    store::PgStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("SERVER_HOST and SERVER_PORT must form a socket address")?;

    let missing = config.missing();
    let router = if missing.is_empty() {
        create_router(build_state(config).await?)
    } else {
        tracing::error!(
            missing = %missing.join(", "),
            "required settings are missing; every request will answer 'server is not configured'"
        );
        create_unconfigured_router(&config)
    };

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("api received shutdown signal");
            }
        })
        .await?;

    Ok(())
}

async fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    let (Some(database_url), Some(auth), Some(storage_config)) = (
        config.database_url.clone(),
        config.auth.clone(),
        config.storage.clone(),
    ) else {
        anyhow::bail!("configuration is incomplete");
    };

    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %storage_config.bucket,
        max_upload_bytes = config.max_upload_bytes,
        "loaded api configuration"
    );

    let pool = db::init_pool_with_size(&database_url, config.database_max_pool_size)?;
    if config.run_migrations {
        let applied = db::run_migrations(&pool)?;
        tracing::info!(applied, "database migrations applied");
    }

    let s3_client = build_client(&storage_config).await?;
    let storage = Arc::new(S3Storage::new(
        s3_client,
        storage_config.bucket.clone(),
        storage_config.public_base_url.clone(),
    ));

    let verifier: Arc<dyn TokenVerifier> = match auth {
        AuthConfig::Jwt { secret, audience } => {
            tracing::info!("verifying bearer tokens locally");
            Arc::new(JwtVerifier::new(&secret, &audience))
        }
        AuthConfig::Remote { base_url, anon_key } => {
            tracing::info!(%base_url, "verifying bearer tokens with the identity provider");
            Arc::new(RemoteVerifier::new(
                reqwest::Client::new(),
                &base_url,
                anon_key,
            ))
        }
    };

    Ok(AppState::new(
        config,
        Arc::new(PgStore::new(pool)),
        storage,
        verifier,
        Arc::new(EmailClaimant),
    ))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
