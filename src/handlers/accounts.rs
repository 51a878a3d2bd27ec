use crate::app::AppState;
use crate::auth::{self, CurrentUser};
use crate::error::AppError;
use crate::models::{Account, DepositReceipt, UserView};
use crate::portfolio;
use crate::trading;
use crate::validation::{DepositForm, LoginForm, RegisterForm};
use axum::{extract::State, http::StatusCode, response::Redirect, Form, Json};
use tower_sessions::Session;

/// Register a new user and log them in.
pub async fn register(
    session: Session,
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let user = auth::register(&state.pool, state.starting_cash, &form).await?;
    auth::start_session(&session, user.id).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// Log a user in. Any identity already on the session is forgotten first.
pub async fn login(
    session: Session,
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<UserView>, AppError> {
    session.clear().await;

    let user = auth::login(&state.pool, &form).await?;
    auth::start_session(&session, user.id).await?;
    Ok(Json(UserView::from(&user)))
}

/// Log the user out by destroying the session.
pub async fn logout(session: Session) -> Result<Redirect, AppError> {
    session.flush().await?;
    Ok(Redirect::to("/login"))
}

/// Account summary for the logged-in user.
pub async fn get_account(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(portfolio::get_account(&state.pool, user_id).await?))
}

/// Add funds to the logged-in user's cash balance.
pub async fn deposit(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Form(form): Form<DepositForm>,
) -> Result<Json<DepositReceipt>, AppError> {
    Ok(Json(trading::deposit(&state.pool, user_id, &form).await?))
}
