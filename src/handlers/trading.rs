use crate::app::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::TradeReceipt;
use crate::portfolio;
use crate::trading;
use crate::validation::TradeForm;
use axum::{extract::State, http::StatusCode, Form, Json};

/// Buy shares for the logged-in user. The form carries `symbol` and `shares`.
#[axum::debug_handler]
pub async fn buy_stock(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Form(form): Form<TradeForm>,
) -> Result<(StatusCode, Json<TradeReceipt>), AppError> {
    let receipt = trading::buy(&state.pool, &*state.quotes, user_id, &form).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Sell shares the logged-in user holds. The form carries `symbol` and `shares`.
pub async fn sell_stock(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Form(form): Form<TradeForm>,
) -> Result<(StatusCode, Json<TradeReceipt>), AppError> {
    let receipt = trading::sell(&state.pool, &*state.quotes, user_id, &form).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Symbols the logged-in user has traded, offered as sell choices.
pub async fn get_sell_symbols(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(portfolio::get_traded_symbols(&state.pool, user_id).await?))
}
