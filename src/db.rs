use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{Deposit, Holding, NewTransaction, Transaction, User, UserId};

#[cfg(test)]
pub(crate) mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt {column} value {value:?}")]
    Corrupt { column: &'static str, value: String },

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("username already exists")]
    DuplicateUsername,
}

/// Access to users and their ledgers. Every method takes the user explicitly.
///
/// Implementations are used inside [`DatabasePool::transaction`], so a caller
/// that returns an error after writing leaves nothing behind.
pub trait Repository {
    fn insert_user(
        &mut self,
        username: &str,
        password_hash: &str,
        starting_cash: Decimal,
    ) -> Result<User, StoreError>;

    fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    fn get_balance(&self, user_id: UserId) -> Result<Decimal, StoreError>;

    fn set_balance(&mut self, user_id: UserId, cash: Decimal) -> Result<(), StoreError>;

    fn append_transaction(
        &mut self,
        user_id: UserId,
        entry: &NewTransaction,
    ) -> Result<Transaction, StoreError>;

    /// Most recent first.
    fn list_transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError>;

    fn append_deposit(&mut self, user_id: UserId, amount: Decimal) -> Result<Deposit, StoreError>;

    /// Most recent first.
    fn list_deposits(&self, user_id: UserId) -> Result<Vec<Deposit>, StoreError>;

    fn net_shares(&self, user_id: UserId, symbol: &str) -> Result<i64, StoreError> {
        Ok(self
            .list_transactions(user_id)?
            .iter()
            .filter(|t| t.symbol == symbol)
            .map(|t| t.shares)
            .sum())
    }

    /// Symbols with non-zero net shares, ordered by symbol.
    fn holdings(&self, user_id: UserId) -> Result<Vec<Holding>, StoreError> {
        let mut net: BTreeMap<String, i64> = BTreeMap::new();
        for t in self.list_transactions(user_id)? {
            *net.entry(t.symbol).or_default() += t.shares;
        }
        Ok(net
            .into_iter()
            .filter(|(_, shares)| *shares != 0)
            .map(|(symbol, shares)| Holding { symbol, shares })
            .collect())
    }

    /// Every symbol the user has ever traded, closed positions included.
    fn traded_symbols(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        let symbols: BTreeSet<String> = self
            .list_transactions(user_id)?
            .into_iter()
            .map(|t| t.symbol)
            .collect();
        Ok(symbols.into_iter().collect())
    }
}

#[derive(Clone)]
pub struct DatabasePool(Arc<Mutex<Connection>>);

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        hash TEXT NOT NULL,
        cash TEXT NOT NULL,
        starting_cash TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        shares INTEGER NOT NULL,
        price TEXT NOT NULL,
        transacted_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id)
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_user_symbol
        ON transactions(user_id, symbol);

    CREATE TABLE IF NOT EXISTS deposits (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        deposited_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id)
    );
";

impl DatabasePool {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self(Arc::new(Mutex::new(conn))))
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction while holding the
    /// connection lock. Commits when `f` succeeds, rolls back otherwise.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Repository) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.0.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let out = {
            let mut repo = SqliteRepository { conn: &tx };
            f(&mut repo)?
        };

        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

struct SqliteRepository<'a> {
    conn: &'a Connection,
}

fn decimal(column: &'static str, value: String) -> Result<Decimal, StoreError> {
    Decimal::from_str(&value).map_err(|_| StoreError::Corrupt { column, value })
}

fn timestamp(column: &'static str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt { column, value })
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

type UserRow = (UserId, String, String, String, String);

fn user_from_row((id, username, password_hash, cash, starting_cash): UserRow) -> Result<User, StoreError> {
    Ok(User {
        id,
        username,
        password_hash,
        cash: decimal("cash", cash)?,
        starting_cash: decimal("starting_cash", starting_cash)?,
    })
}

impl SqliteRepository<'_> {
    fn query_user(&self, clause: &str, param: &dyn rusqlite::ToSql) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT id, username, hash, cash, starting_cash FROM users WHERE {clause}");
        let row: Option<UserRow> = self
            .conn
            .query_row(&sql, [param], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .optional()?;
        row.map(user_from_row).transpose()
    }
}

impl Repository for SqliteRepository<'_> {
    fn insert_user(
        &mut self,
        username: &str,
        password_hash: &str,
        starting_cash: Decimal,
    ) -> Result<User, StoreError> {
        let cash = starting_cash.to_string();
        match self.conn.execute(
            "INSERT INTO users (username, hash, cash, starting_cash) VALUES (?1, ?2, ?3, ?3)",
            params![username, password_hash, cash],
        ) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateUsername)
            }
            Err(e) => return Err(e.into()),
        }

        Ok(User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            cash: starting_cash,
            starting_cash,
        })
    }

    fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.query_user("username = ?1", &username)
    }

    fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.query_user("id = ?1", &user_id)
    }

    fn get_balance(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        let cash: Option<String> = self
            .conn
            .query_row("SELECT cash FROM users WHERE id = ?1", [user_id], |row| {
                row.get(0)
            })
            .optional()?;
        match cash {
            Some(cash) => decimal("cash", cash),
            None => Err(StoreError::UserNotFound(user_id)),
        }
    }

    fn set_balance(&mut self, user_id: UserId, cash: Decimal) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE users SET cash = ?1 WHERE id = ?2",
            params![cash.to_string(), user_id],
        )?;
        if updated == 0 {
            return Err(StoreError::UserNotFound(user_id));
        }
        Ok(())
    }

    fn append_transaction(
        &mut self,
        user_id: UserId,
        entry: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let transaction = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            symbol: entry.symbol.clone(),
            shares: entry.shares,
            price: entry.price,
            transacted_at: Utc::now(),
        };

        self.conn.execute(
            "INSERT INTO transactions (id, user_id, symbol, shares, price, transacted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &transaction.id,
                user_id,
                &transaction.symbol,
                transaction.shares,
                transaction.price.to_string(),
                format_timestamp(transaction.transacted_at),
            ],
        )?;

        Ok(transaction)
    }

    fn list_transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, symbol, shares, price, transacted_at
             FROM transactions
             WHERE user_id = ?1
             ORDER BY transacted_at DESC, rowid DESC",
        )?;

        let rows = stmt
            .query_map([user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, symbol, shares, price, transacted_at)| {
                Ok(Transaction {
                    id,
                    user_id,
                    symbol,
                    shares,
                    price: decimal("price", price)?,
                    transacted_at: timestamp("transacted_at", transacted_at)?,
                })
            })
            .collect()
    }

    fn append_deposit(&mut self, user_id: UserId, amount: Decimal) -> Result<Deposit, StoreError> {
        let deposit = Deposit {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            amount,
            deposited_at: Utc::now(),
        };

        self.conn.execute(
            "INSERT INTO deposits (id, user_id, amount, deposited_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                &deposit.id,
                user_id,
                amount.to_string(),
                format_timestamp(deposit.deposited_at),
            ],
        )?;

        Ok(deposit)
    }

    fn list_deposits(&self, user_id: UserId) -> Result<Vec<Deposit>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, amount, deposited_at
             FROM deposits
             WHERE user_id = ?1
             ORDER BY deposited_at DESC, rowid DESC",
        )?;

        let rows = stmt
            .query_map([user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, amount, deposited_at)| {
                Ok(Deposit {
                    id,
                    user_id,
                    amount: decimal("amount", amount)?,
                    deposited_at: timestamp("deposited_at", deposited_at)?,
                })
            })
            .collect()
    }

    fn net_shares(&self, user_id: UserId, symbol: &str) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(shares), 0) FROM transactions WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            |row| row.get(0),
        )?)
    }

    fn holdings(&self, user_id: UserId) -> Result<Vec<Holding>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, SUM(shares) AS shares
             FROM transactions
             WHERE user_id = ?1
             GROUP BY symbol
             HAVING SUM(shares) != 0
             ORDER BY symbol",
        )?;

        let holdings = stmt
            .query_map([user_id], |row| {
                Ok(Holding {
                    symbol: row.get(0)?,
                    shares: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(holdings)
    }

    fn traded_symbols(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol FROM transactions WHERE user_id = ?1 GROUP BY symbol ORDER BY symbol",
        )?;
        let symbols = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(symbol: &str, shares: i64, price: Decimal) -> NewTransaction {
        NewTransaction {
            symbol: symbol.to_string(),
            shares,
            price,
        }
    }

    async fn pool_with_user() -> (DatabasePool, UserId) {
        let pool = DatabasePool::in_memory().unwrap();
        let user = pool
            .transaction(|repo| repo.insert_user("alice", "hash", dec!(10000.00)))
            .await
            .unwrap();
        (pool, user.id)
    }

    #[tokio::test]
    async fn duplicate_username_is_reported() {
        let (pool, _) = pool_with_user().await;
        let err = pool
            .transaction(|repo| repo.insert_user("alice", "other", dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername));
    }

    #[tokio::test]
    async fn decimals_survive_storage_exactly() {
        let (pool, user_id) = pool_with_user().await;
        let cash = pool
            .transaction(|repo| {
                repo.set_balance(user_id, dec!(1234.5678))?;
                repo.get_balance(user_id)
            })
            .await
            .unwrap();
        assert_eq!(cash, dec!(1234.5678));
    }

    #[tokio::test]
    async fn unknown_user_has_no_balance() {
        let (pool, _) = pool_with_user().await;
        let err = pool
            .transaction(|repo| repo.get_balance(999))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(999)));
    }

    #[tokio::test]
    async fn holdings_group_by_symbol_and_drop_closed_positions() {
        let (pool, user_id) = pool_with_user().await;
        let holdings = pool
            .transaction(|repo| {
                repo.append_transaction(user_id, &trade("MSFT", 3, dec!(300)))?;
                repo.append_transaction(user_id, &trade("AAPL", 10, dec!(150)))?;
                repo.append_transaction(user_id, &trade("AAPL", -4, dec!(160)))?;
                repo.append_transaction(user_id, &trade("TSLA", 2, dec!(200)))?;
                repo.append_transaction(user_id, &trade("TSLA", -2, dec!(210)))?;
                repo.holdings(user_id)
            })
            .await
            .unwrap();

        assert_eq!(
            holdings,
            vec![
                Holding { symbol: "AAPL".into(), shares: 6 },
                Holding { symbol: "MSFT".into(), shares: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn net_shares_of_untraded_symbol_is_zero() {
        let (pool, user_id) = pool_with_user().await;
        let net = pool
            .transaction(|repo| repo.net_shares(user_id, "NOPE"))
            .await
            .unwrap();
        assert_eq!(net, 0);
    }

    #[tokio::test]
    async fn traded_symbols_include_closed_positions_once() {
        let (pool, user_id) = pool_with_user().await;
        let symbols = pool
            .transaction(|repo| {
                repo.append_transaction(user_id, &trade("MSFT", 2, dec!(1)))?;
                repo.append_transaction(user_id, &trade("AAPL", 1, dec!(1)))?;
                repo.append_transaction(user_id, &trade("MSFT", -2, dec!(1)))?;
                repo.traded_symbols(user_id)
            })
            .await
            .unwrap();
        assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);

        let none = pool
            .transaction(|repo| repo.traded_symbols(user_id + 1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn history_is_most_recent_first() {
        let (pool, user_id) = pool_with_user().await;
        let history = pool
            .transaction(|repo| {
                repo.append_transaction(user_id, &trade("AAA", 1, dec!(1)))?;
                repo.append_transaction(user_id, &trade("BBB", 2, dec!(2)))?;
                repo.append_transaction(user_id, &trade("CCC", 3, dec!(3)))?;
                repo.list_transactions(user_id)
            })
            .await
            .unwrap();

        let symbols: Vec<&str> = history.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["CCC", "BBB", "AAA"]);
    }

    #[tokio::test]
    async fn failed_closure_rolls_back_every_write() {
        let (pool, user_id) = pool_with_user().await;

        let result: Result<(), StoreError> = pool
            .transaction(|repo| {
                repo.append_transaction(user_id, &trade("AAA", 5, dec!(10)))?;
                repo.append_deposit(user_id, dec!(25))?;
                repo.set_balance(user_id, dec!(1))?;
                Err(StoreError::UserNotFound(user_id))
            })
            .await;
        assert!(result.is_err());

        let (cash, transactions, deposits) = pool
            .transaction(|repo| {
                Ok::<_, StoreError>((
                    repo.get_balance(user_id)?,
                    repo.list_transactions(user_id)?,
                    repo.list_deposits(user_id)?,
                ))
            })
            .await
            .unwrap();
        assert_eq!(cash, dec!(10000.00));
        assert!(transactions.is_empty());
        assert!(deposits.is_empty());
    }

    #[tokio::test]
    async fn ledger_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finance.db");

        let user_id = {
            let pool = DatabasePool::open(&path).unwrap();
            pool.transaction(|repo| {
                let user = repo.insert_user("bob", "hash", dec!(500))?;
                repo.append_transaction(user.id, &trade("AAA", 2, dec!(12.34)))?;
                Ok::<_, StoreError>(user.id)
            })
            .await
            .unwrap()
        };

        let pool = DatabasePool::open(&path).unwrap();
        let (user, history) = pool
            .transaction(|repo| {
                Ok::<_, StoreError>((repo.find_user("bob")?, repo.list_transactions(user_id)?))
            })
            .await
            .unwrap();

        let user = user.unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.starting_cash, dec!(500));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, dec!(12.34));
    }
}
