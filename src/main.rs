// src/main.rs

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vocablab::config::Config;
use vocablab::handlers::auth;
use vocablab::routes;
use vocablab::scoring::{DisabledScorer, OpenAiScorer, SentenceScorer};
use vocablab::state::AppState;

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env is read inside)
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .expect("DATABASE_URL is not a valid SQLite URL")
        .create_if_missing(true)
        .foreign_keys(true);

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(connect_options.clone())
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to open database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = auth::provision_admins(&pool, &config).await {
        tracing::error!("Failed to provision admin accounts: {}", e);
    }

    let scorer: Arc<dyn SentenceScorer> = match &config.llm_api_key {
        Some(key) => match OpenAiScorer::new(
            key,
            &config.llm_base_url,
            &config.llm_model,
            &config.static_dir,
        ) {
            Ok(scorer) => {
                tracing::info!("Sentence scoring via {} ({})", config.llm_base_url, config.llm_model);
                Arc::new(scorer)
            }
            Err(e) => {
                tracing::error!("Sentence scorer unavailable: {}", e);
                Arc::new(DisabledScorer)
            }
        },
        None => {
            tracing::warn!("LLM_API_KEY not set; sentence questions will score 0");
            Arc::new(DisabledScorer)
        }
    };

    let state = AppState {
        pool,
        config: config.clone(),
        scorer,
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listening address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}
