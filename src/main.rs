use roster_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    media::{MediaHost, MediaState, S3MediaHost},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::{error::Error, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, then hands over to `run`. Any startup
/// failure ends the process with a non-zero exit code.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet.
            eprintln!("FATAL: invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise verbose for this crate and request-level for tower_http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "roster_portal=debug,tower_http=info".into());

    // 3. Pretty logs locally, JSON in production for log aggregation.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "FATAL: server stopped");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn Error>> {
    // 4. Database Initialization (Postgres) and schema migrations.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .map_err(|e| format!("failed to connect to Postgres (check DATABASE_URL): {}", e))?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Media Host Initialization (S3-compatible)
    let media_host = S3MediaHost::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    );

    // LOCAL-ONLY: create the MinIO bucket on first run.
    if config.env == Env::Local {
        media_host.ensure_bucket_exists().await;
    }

    // Startup connectivity check. A failure is logged, not fatal: uploads will report it.
    match media_host.ping().await {
        Ok(()) => tracing::info!(bucket = %config.s3_bucket, "Media host reachable."),
        Err(e) => tracing::warn!(bucket = %config.s3_bucket, error = %e, "Media host unreachable."),
    }

    let media = Arc::new(media_host) as MediaState;

    // 6. Unified State Assembly
    let port = config.port;
    let app_state = AppState {
        repo,
        media,
        config,
    };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let address = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&address).await?;

    tracing::info!("Listening on {}", address);
    tracing::info!(
        "API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui",
        port
    );

    axum::serve(listener, app).await?;
    Ok(())
}
