use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::db::DatabasePool;
use crate::error::AppError;
use crate::finnhub::QuoteProvider;
use crate::models::{Account, Deposit, Holding, Portfolio, Position, Transaction, UserId};

/// Value every held symbol at its current quote.
///
/// Cash and holdings are read in one snapshot; quotes are fetched afterwards,
/// one symbol at a time. A failed lookup fails the whole valuation rather
/// than dropping the holding.
pub async fn get_portfolio(
    pool: &DatabasePool,
    quotes: &dyn QuoteProvider,
    user_id: UserId,
) -> Result<Portfolio, AppError> {
    let (cash, holdings) = pool
        .transaction(|repo| -> Result<_, AppError> {
            Ok((repo.get_balance(user_id)?, repo.holdings(user_id)?))
        })
        .await?;

    value_holdings(quotes, cash, holdings).await
}

pub async fn value_holdings(
    quotes: &dyn QuoteProvider,
    cash: Decimal,
    holdings: Vec<Holding>,
) -> Result<Portfolio, AppError> {
    let mut positions = Vec::with_capacity(holdings.len());
    let mut total = cash;

    for holding in holdings {
        let quote = quotes.lookup(&holding.symbol).await.map_err(|e| {
            tracing::warn!("valuation of {} failed: {}", holding.symbol, e);
            AppError::from(e)
        })?;

        let value = quote
            .price
            .checked_mul(Decimal::from(holding.shares))
            .and_then(|value| total.checked_add(value).map(|sum| (value, sum)));
        let Some((value, sum)) = value else {
            tracing::warn!("valuation of {} overflowed at {}", holding.symbol, quote.price);
            return Err(AppError::OutOfRange("portfolio value"));
        };
        total = sum;
        positions.push(Position {
            symbol: holding.symbol,
            shares: holding.shares,
            price: quote.price,
            value,
        });
    }

    Ok(Portfolio {
        positions,
        cash,
        total,
    })
}

/// The user's trade ledger, most recent first.
pub async fn get_history(pool: &DatabasePool, user_id: UserId) -> Result<Vec<Transaction>, AppError> {
    pool.transaction(|repo| -> Result<_, AppError> { Ok(repo.list_transactions(user_id)?) })
        .await
}

/// Symbols the user has traded, for choosing what to sell.
pub async fn get_traded_symbols(pool: &DatabasePool, user_id: UserId) -> Result<Vec<String>, AppError> {
    pool.transaction(|repo| -> Result<_, AppError> { Ok(repo.traded_symbols(user_id)?) })
        .await
}

/// Account summary, including whether the cached balance agrees with the ledgers.
pub async fn get_account(pool: &DatabasePool, user_id: UserId) -> Result<Account, AppError> {
    let (user, deposits, transactions) = pool
        .transaction(|repo| -> Result<_, AppError> {
            let user = repo.get_user(user_id)?.ok_or(AppError::Unauthenticated)?;
            Ok((user, repo.list_deposits(user_id)?, repo.list_transactions(user_id)?))
        })
        .await?;

    let deposited = deposits
        .iter()
        .try_fold(Decimal::ZERO, |sum, d| sum.checked_add(d.amount))
        .ok_or(AppError::OutOfRange("deposits"))?;

    let expected = expected_cash(user.starting_cash, &deposits, &transactions);
    let reconciled = expected == Some(user.cash);
    if !reconciled {
        tracing::error!(
            "user {} cash {} disagrees with ledger value {:?}",
            user.id,
            user.cash,
            expected
        );
    }

    Ok(Account {
        id: user.id,
        username: user.username,
        cash: user.cash,
        starting_cash: user.starting_cash,
        deposited,
        reconciled,
    })
}

/// Cash implied by the ledgers: starting cash, plus deposits, minus buys, plus sells.
///
/// Entries are replayed oldest first so the running total follows the same
/// path the balance did. `None` if that replay leaves the `Decimal` range.
pub fn expected_cash(
    starting_cash: Decimal,
    deposits: &[Deposit],
    transactions: &[Transaction],
) -> Option<Decimal> {
    let mut flows: Vec<(DateTime<Utc>, Decimal)> = deposits
        .iter()
        .rev()
        .map(|d| (d.deposited_at, d.amount))
        .collect();
    for t in transactions.iter().rev() {
        flows.push((t.transacted_at, t.cash_flow()?));
    }
    flows.sort_by_key(|(at, _)| *at);

    flows
        .into_iter()
        .try_fold(starting_cash, |cash, (_, flow)| cash.checked_add(flow))
}
