use crate::app::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::{Portfolio, Transaction};
use crate::portfolio;
use axum::{extract::State, Json};

pub async fn get_portfolio(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Portfolio>, AppError> {
    let portfolio = portfolio::get_portfolio(&state.pool, &*state.quotes, user_id).await?;
    Ok(Json(portfolio))
}

pub async fn get_transaction_history(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(portfolio::get_history(&state.pool, user_id).await?))
}
