//! Form payloads and the parsers that turn them into validated values.
//!
//! Fields arrive as optional strings; nothing past this module sees an
//! unvalidated share count or amount.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::round_cents;

#[derive(Deserialize, Debug, Default, Clone)]
pub struct TradeForm {
    pub symbol: Option<String>,
    pub shares: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct DepositForm {
    pub amount: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct QuoteForm {
    pub symbol: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirmation: Option<String>,
}

/// A buy or sell request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOrder {
    pub symbol: String,
    pub shares: i64,
}

impl TryFrom<&TradeForm> for TradeOrder {
    type Error = AppError;

    fn try_from(form: &TradeForm) -> Result<Self, Self::Error> {
        let symbol = parse_symbol(form.symbol.as_deref())?;
        let shares = parse_shares(form.shares.as_deref())?;
        Ok(Self { symbol, shares })
    }
}

/// Returns the trimmed value, or `MissingField` when absent or blank.
pub fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, AppError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::MissingField(field)),
    }
}

pub fn parse_symbol(value: Option<&str>) -> Result<String, AppError> {
    Ok(require(value, "symbol")?.to_uppercase())
}

/// Share counts must be exact positive integers: `"10"` is fine, `"10.5"`
/// and `"10.0"` are not.
pub fn parse_shares(value: Option<&str>) -> Result<i64, AppError> {
    let raw = require(value, "shares")?;
    match raw.parse::<i64>() {
        Ok(shares) if shares >= 1 => Ok(shares),
        _ => Err(AppError::InvalidFormat("shares")),
    }
}

/// Deposit amounts accept plain or scientific notation and are rounded to
/// cents. Anything that rounds to zero or below is rejected.
pub fn parse_amount(value: Option<&str>) -> Result<Decimal, AppError> {
    let raw = require(value, "amount")?;
    let amount = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| AppError::InvalidFormat("amount"))?;

    let amount = round_cents(amount);
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidFormat("amount"));
    }
    Ok(amount)
}
