#![allow(dead_code)]
//! Shared fixtures: a scripted quote provider, an in-memory app, and
//! helpers for driving it with form posts and session cookies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use stocksim_finance::app::{self, AppState};
use stocksim_finance::auth;
use stocksim_finance::db::DatabasePool;
use stocksim_finance::finnhub::{QuoteError, QuoteProvider};
use stocksim_finance::models::{Quote, UserId};
use stocksim_finance::validation::RegisterForm;
use tower_sessions::MemoryStore;

pub const STARTING_CASH: Decimal = dec!(10000.00);

/// Quote provider with a price table that tests can change between calls.
#[derive(Default)]
pub struct StaticQuotes {
    prices: Mutex<HashMap<String, Decimal>>,
    outage: Mutex<bool>,
    lookups: AtomicUsize,
}

impl StaticQuotes {
    pub fn new(prices: &[(&str, Decimal)]) -> Arc<Self> {
        let quotes = Self::default();
        for (symbol, price) in prices {
            quotes.set_price(symbol, *price);
        }
        Arc::new(quotes)
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn delist(&self, symbol: &str) {
        self.prices.lock().unwrap().remove(symbol);
    }

    pub fn set_outage(&self, down: bool) {
        *self.outage.lock().unwrap() = down;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for StaticQuotes {
    async fn lookup(&self, symbol: &str) -> Result<Quote, QuoteError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if *self.outage.lock().unwrap() {
            return Err(QuoteError::Unavailable("scripted outage".to_string()));
        }
        let symbol = symbol.trim().to_uppercase();
        let price = self.prices.lock().unwrap().get(&symbol).copied();
        match price {
            Some(price) => Ok(Quote { symbol, price }),
            None => Err(QuoteError::UnknownSymbol(symbol)),
        }
    }
}

pub fn test_state(quotes: Arc<StaticQuotes>) -> AppState {
    AppState {
        pool: DatabasePool::in_memory().unwrap(),
        quotes,
        starting_cash: STARTING_CASH,
    }
}

pub fn test_app(state: AppState) -> Router {
    app::router(state, MemoryStore::default(), time::Duration::days(1))
}

pub async fn register_user(pool: &DatabasePool, username: &str) -> UserId {
    let form = RegisterForm {
        username: Some(username.to_string()),
        password: Some("secret".to_string()),
        confirmation: Some("secret".to_string()),
    };
    auth::register(pool, STARTING_CASH, &form).await.unwrap().id
}

pub fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// The `name=value` part of every Set-Cookie header, joined for a Cookie header.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|sc| sc.split(';').next().unwrap_or("").to_string())
        .collect();
    if cookies.is_empty() {
        None
    } else {
        Some(cookies.join("; "))
    }
}

pub async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "response body is not the expected JSON ({e}): {}",
            String::from_utf8_lossy(&bytes)
        )
    })
}
