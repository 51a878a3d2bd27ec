use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// User represents a registered trader.
/// `cash` is a cached aggregate of the ledgers and is kept consistent with them.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub cash: Decimal,
    pub starting_cash: Decimal,
}

/// Public view of a user, safe to hand back to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub cash: Decimal,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            cash: user.cash,
        }
    }
}

/// One immutable row of the trade ledger. Positive shares are buys, negative are sells.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub user_id: UserId,
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
    pub transacted_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed effect on cash: negative for a buy, positive for a sell.
    /// `None` when the trade value does not fit in a `Decimal`.
    pub fn cash_flow(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.shares)).map(|value| -value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Deposit {
    pub id: String,
    pub user_id: UserId,
    pub amount: Decimal,
    pub deposited_at: DateTime<Utc>,
}

/// Net position in one symbol, derived from the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub symbol: String,
    pub shares: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
}

/// A holding valued at the current quote.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
    pub value: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Portfolio {
    pub positions: Vec<Position>,
    pub cash: Decimal,
    pub total: Decimal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub transaction: Transaction,
    /// Cost of a buy or proceeds of a sell.
    pub amount: Decimal,
    pub cash: Decimal,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DepositReceipt {
    pub deposit: Deposit,
    pub cash: Decimal,
    pub message: String,
}

/// Account summary with a ledger reconciliation flag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub cash: Decimal,
    pub starting_cash: Decimal,
    pub deposited: Decimal,
    pub reconciled: bool,
}

/// Rounds to cents, half away from zero.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats an amount as US dollars, e.g. `$1,234.50`.
pub fn usd(amount: Decimal) -> String {
    let rounded = round_cents(amount);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}${grouped}.{cents}")
}
