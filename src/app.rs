use std::sync::Arc;

use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tracing::Level;

use crate::db::DatabasePool;
use crate::finnhub::QuoteProvider;
use crate::handlers::{
    accounts::{deposit, get_account, login, logout, register},
    portfolio::{get_portfolio, get_transaction_history},
    quotes::get_quote,
    trading::{buy_stock, get_sell_symbols, sell_stock},
};

/// Shared handles every request needs.
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub quotes: Arc<dyn QuoteProvider>,
    pub starting_cash: Decimal,
}

/// Build the application with its session, cache-control and tracing layers.
pub fn router<Store>(state: AppState, session_store: Store, session_expiry: time::Duration) -> Router
where
    Store: SessionStore + Clone,
{
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(session_expiry))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/");

    Router::new()
        // Portfolio routes
        .route("/", get(get_portfolio))
        .route("/portfolio", get(get_portfolio))
        .route("/history", get(get_transaction_history))
        // Trading routes
        .route("/quote", post(get_quote))
        .route("/buy", post(buy_stock))
        .route("/sell", get(get_sell_symbols).post(sell_stock))
        // Account routes
        .route("/account", get(get_account))
        .route("/deposit", post(deposit))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout).post(logout))
        .with_state(state)
        .layer(session_layer)
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
}
