//! Buy, sell and deposit.
//!
//! Each operation validates its form, resolves a quote outside the database
//! lock, then settles inside one repository transaction. The `settle_*`
//! functions check every precondition before their first write.

use rust_decimal::Decimal;

use crate::db::{DatabasePool, Repository};
use crate::error::AppError;
use crate::finnhub::QuoteProvider;
use crate::models::{usd, DepositReceipt, NewTransaction, Quote, TradeReceipt, UserId};
use crate::validation::{parse_amount, DepositForm, TradeForm, TradeOrder};

pub async fn buy(
    pool: &DatabasePool,
    quotes: &dyn QuoteProvider,
    user_id: UserId,
    form: &TradeForm,
) -> Result<TradeReceipt, AppError> {
    let order = TradeOrder::try_from(form)?;
    let quote = quotes.lookup(&order.symbol).await?;

    let receipt = pool
        .transaction(|repo| settle_buy(repo, user_id, &order, &quote))
        .await?;

    tracing::info!(
        "user {} bought {} {} at {} (cash now {})",
        user_id,
        order.shares,
        quote.symbol,
        quote.price,
        receipt.cash
    );
    Ok(receipt)
}

pub async fn sell(
    pool: &DatabasePool,
    quotes: &dyn QuoteProvider,
    user_id: UserId,
    form: &TradeForm,
) -> Result<TradeReceipt, AppError> {
    let order = TradeOrder::try_from(form)?;
    let quote = quotes.lookup(&order.symbol).await?;

    let receipt = pool
        .transaction(|repo| settle_sell(repo, user_id, &order, &quote))
        .await?;

    tracing::info!(
        "user {} sold {} {} at {} (cash now {})",
        user_id,
        order.shares,
        quote.symbol,
        quote.price,
        receipt.cash
    );
    Ok(receipt)
}

pub async fn deposit(
    pool: &DatabasePool,
    user_id: UserId,
    form: &DepositForm,
) -> Result<DepositReceipt, AppError> {
    let amount = parse_amount(form.amount.as_deref())?;

    let receipt = pool
        .transaction(|repo| settle_deposit(repo, user_id, amount))
        .await?;

    tracing::info!("user {} deposited {} (cash now {})", user_id, amount, receipt.cash);
    Ok(receipt)
}

fn trade_value(quote: &Quote, shares: i64) -> Option<Decimal> {
    quote.price.checked_mul(Decimal::from(shares))
}

pub fn settle_buy(
    repo: &mut dyn Repository,
    user_id: UserId,
    order: &TradeOrder,
    quote: &Quote,
) -> Result<TradeReceipt, AppError> {
    let cash = repo.get_balance(user_id)?;
    let cost = trade_value(quote, order.shares).ok_or(AppError::InsufficientFunds)?;
    if cash < cost {
        return Err(AppError::InsufficientFunds);
    }

    let transaction = repo.append_transaction(
        user_id,
        &NewTransaction {
            symbol: quote.symbol.clone(),
            shares: order.shares,
            price: quote.price,
        },
    )?;
    let cash = cash - cost;
    repo.set_balance(user_id, cash)?;

    let message = format!(
        "Bought {} shares of {} for {}.",
        order.shares,
        transaction.symbol,
        usd(cost)
    );
    Ok(TradeReceipt {
        transaction,
        amount: cost,
        cash,
        message,
    })
}

pub fn settle_sell(
    repo: &mut dyn Repository,
    user_id: UserId,
    order: &TradeOrder,
    quote: &Quote,
) -> Result<TradeReceipt, AppError> {
    let owned = repo.net_shares(user_id, &quote.symbol)?;
    if order.shares > owned {
        return Err(AppError::InsufficientShares);
    }
    let proceeds = trade_value(quote, order.shares).ok_or(AppError::OutOfRange("cash"))?;
    let cash = repo
        .get_balance(user_id)?
        .checked_add(proceeds)
        .ok_or(AppError::OutOfRange("cash"))?;

    let transaction = repo.append_transaction(
        user_id,
        &NewTransaction {
            symbol: quote.symbol.clone(),
            shares: -order.shares,
            price: quote.price,
        },
    )?;
    repo.set_balance(user_id, cash)?;

    let message = format!(
        "Successfully sold {} shares of {} for {}.",
        order.shares,
        transaction.symbol,
        usd(proceeds)
    );
    Ok(TradeReceipt {
        transaction,
        amount: proceeds,
        cash,
        message,
    })
}

pub fn settle_deposit(
    repo: &mut dyn Repository,
    user_id: UserId,
    amount: Decimal,
) -> Result<DepositReceipt, AppError> {
    let cash = repo
        .get_balance(user_id)?
        .checked_add(amount)
        .ok_or(AppError::InvalidFormat("amount"))?;
    let deposit = repo.append_deposit(user_id, amount)?;
    repo.set_balance(user_id, cash)?;

    Ok(DepositReceipt {
        deposit,
        cash,
        message: format!("Successfully added {} to user balance.", usd(amount)),
    })
}
