use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quickchat=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dirs(&config);

    // CLI --web-dir overrides config file
    let web_dir: Option<PathBuf> = args
        .web_dir
        .or(config.server.web_dir.clone())
        .map(PathBuf::from)
        .filter(|p| {
            if p.is_dir() {
                true
            } else {
                tracing::warn!(
                    "Web UI directory {:?} does not exist, skipping static file serving",
                    p
                );
                false
            }
        });

    let db = quickchat_db::create_pool(&config.database.url, config.database.max_connections).await?;
    quickchat_db::run_migrations(&db).await?;

    let state = quickchat_core::AppState {
        db,
        event_bus: quickchat_core::events::EventBus::default(),
        config: quickchat_core::AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
            max_upload_size: config.storage.max_upload_size,
            reconnect_max_attempts: config.gateway.reconnect_max_attempts,
            reconnect_delay_ms: config.gateway.reconnect_delay_ms,
            reconnect_backoff_factor: config.gateway.reconnect_backoff_factor,
        },
        registry: Arc::new(quickchat_core::presence::ConnectionRegistry::new()),
        storage: Arc::new(quickchat_media::Storage::Local(
            quickchat_media::LocalStorage::new(&config.storage.path),
        )),
    };

    let router = quickchat_api::build_router()
        .merge(quickchat_ws::gateway_router())
        .with_state(state);

    let web_ui_status;
    let app = if let Some(ref dir) = web_dir {
        let index_path = dir.join("index.html");
        let spa_fallback = tower_http::services::ServeFile::new(&index_path);
        let serve_dir = tower_http::services::ServeDir::new(dir).not_found_service(spa_fallback);
        web_ui_status = format!("Serving from {dir:?}");
        router.fallback_service(serve_dir)
    } else {
        web_ui_status = "None (API-only mode)".to_string();
        router
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind_address = %config.server.bind_address,
        database = %config.database.url,
        web_ui = %web_ui_status,
        "quickchat server listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down (ctrl-c)...");
        })
        .await?;

    Ok(())
}

/// Ensure data directories exist before the server starts.
fn ensure_data_dirs(config: &config::Config) {
    if let Err(e) = std::fs::create_dir_all(&config.storage.path) {
        tracing::warn!(
            "Could not create storage directory '{}': {}",
            config.storage.path,
            e
        );
    }

    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
    }
}
