use crate::app::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::models::Quote;
use crate::validation::{parse_symbol, QuoteForm};
use axum::{extract::State, Form, Json};

/// Look up the current price of one symbol.
pub async fn get_quote(
    CurrentUser(_): CurrentUser,
    State(state): State<AppState>,
    Form(form): Form<QuoteForm>,
) -> Result<Json<Quote>, AppError> {
    let symbol = parse_symbol(form.symbol.as_deref())?;
    let quote = state.quotes.lookup(&symbol).await?;
    Ok(Json(quote))
}
