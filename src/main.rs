use std::sync::Arc;

use axum::http::header::{ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderValue, Method};
use rusqlite::Connection;
use stocksim_finance::app::{self, AppState};
use stocksim_finance::config::{self, AppConfig};
use stocksim_finance::db::DatabasePool;
use stocksim_finance::finnhub::FinnhubClient;
use tower_http::cors::CorsLayer;
use tower_sessions::ExpiredDeletion;
use tower_sessions_rusqlite_store::RusqliteStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set the log level based on the first argument
    let args: Vec<String> = std::env::args().collect();
    let log_level = config::log_level(args.get(1).map(String::as_str));

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_max_level(log_level)
        .init();

    tracing::info!("Log level set to: {}", log_level);

    let config = AppConfig::from_env()?;
    tracing::debug!("{:?}", config);

    // Initialize our session store as a SQLite database
    let conn = Connection::open(&config.session_db_path)?;
    let session_store = RusqliteStore::new(conn.into());
    session_store.migrate().await?;

    // Start a task to delete expired sessions every minute
    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );

    // Initialize CORS layer
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_origin(config.frontend_url.parse::<HeaderValue>()?)
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![ACCESS_CONTROL_ALLOW_CREDENTIALS, CONTENT_TYPE, COOKIE]);

    // Open the ledger database and the quote client
    let pool = DatabasePool::open(&config.database_path)?;
    let quotes = FinnhubClient::new(&config.quotes)?;

    let state = AppState {
        pool,
        quotes: Arc::new(quotes),
        starting_cash: config.starting_cash,
    };

    let app = app::router(state, session_store, config.session_expiry).layer(cors);

    // Run server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    deletion_task.await??;

    Ok(())
}
