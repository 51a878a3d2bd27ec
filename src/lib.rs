// src/lib.rs
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod finnhub;
pub mod handlers;
pub mod models;
pub mod portfolio;
pub mod trading;
pub mod validation;

// Re-export commonly used items
pub use app::AppState;
pub use db::{DatabasePool, Repository};
pub use error::AppError;
pub use finnhub::{QuoteError, QuoteProvider};
pub use models::*;
