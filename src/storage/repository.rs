use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::domain::{Ledger, LedgerId, Transaction, TransactionKind};

use super::MIGRATION_001_INITIAL;

/// Outcome of an optimistic append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The stored head moved since the transaction was planned; nothing was written.
    Conflict,
}

/// Repository for persisting and loading ledgers with their transaction logs.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL. `?mode=rwc` in the URL creates the file.
    pub async fn connect(database_url: &str, config: &LedgerConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        tracing::debug!(database_url, "connected to ledger store");
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, config: &LedgerConfig) -> Result<Self> {
        let repo = Self::connect(database_url, config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Persist a freshly opened ledger together with its seed transactions.
    /// Returns `false` (and writes nothing) if the owner already has a ledger.
    pub(crate) async fn create_ledger(&self, ledger: &Ledger) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO ledgers (id, owner, balance_cents, head_sequence, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (owner) DO NOTHING
            "#,
        )
        .bind(ledger.id.to_string())
        .bind(&ledger.owner)
        .bind(ledger.balance())
        .bind(ledger.head_sequence())
        .bind(ledger.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save ledger")?
        .rows_affected();

        if inserted == 0 {
            return Ok(false);
        }

        for transaction in ledger.transactions() {
            Self::insert_transaction(&mut tx, transaction).await?;
        }

        tx.commit().await.context("Failed to commit new ledger")?;
        Ok(true)
    }

    /// Append a planned transaction and move the ledger's balance in one
    /// database transaction. The write only happens if the stored head still
    /// matches the state the transaction was planned against.
    pub(crate) async fn append_transaction(&self, transaction: &Transaction) -> Result<AppendOutcome> {
        let balance_before = transaction
            .balance_before()
            .context("Transaction balance out of range")?;
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let updated = sqlx::query(
            r#"
            UPDATE ledgers
            SET balance_cents = ?, head_sequence = ?
            WHERE id = ? AND head_sequence = ? AND balance_cents = ?
            "#,
        )
        .bind(transaction.balance_after)
        .bind(transaction.sequence)
        .bind(transaction.ledger_id.to_string())
        .bind(transaction.sequence - 1)
        .bind(balance_before)
        .execute(&mut *tx)
        .await
        .context("Failed to update ledger balance")?
        .rows_affected();

        if updated != 1 {
            // Dropping `tx` rolls back
            return Ok(AppendOutcome::Conflict);
        }

        Self::insert_transaction(&mut tx, transaction).await?;
        tx.commit().await.context("Failed to commit transaction")?;

        Ok(AppendOutcome::Appended)
    }

    async fn insert_transaction(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        transaction: &Transaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, ledger_id, sequence, kind, amount_cents, description, balance_after_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.ledger_id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.kind.as_str())
        .bind(transaction.amount_cents)
        .bind(&transaction.description)
        .bind(transaction.balance_after)
        .bind(transaction.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .context("Failed to save transaction")?;
        Ok(())
    }

    /// Load a ledger and its full log from a single read snapshot.
    pub async fn load_ledger(&self, id: LedgerId) -> Result<Option<Ledger>> {
        self.load_where("id = ?", id.to_string()).await
    }

    /// Load the ledger owned by `owner`, if any.
    pub async fn find_ledger_by_owner(&self, owner: &str) -> Result<Option<Ledger>> {
        self.load_where("owner = ?", owner.to_string()).await
    }

    async fn load_where(&self, predicate: &str, value: String) -> Result<Option<Ledger>> {
        // Both reads run inside one transaction so the balance and the log
        // come from the same committed state.
        let mut tx = self.pool.begin().await.context("Failed to begin read")?;

        let query = format!(
            "SELECT id, owner, balance_cents, created_at FROM ledgers WHERE {}",
            predicate
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to fetch ledger")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id_str: String = row.get("id");
        let rows = sqlx::query(
            r#"
            SELECT id, ledger_id, sequence, kind, amount_cents, description, balance_after_cents, created_at
            FROM transactions
            WHERE ledger_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(&id_str)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list transactions")?;

        tx.commit().await.context("Failed to finish read")?;

        let transactions = rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?;

        let created_at_str: String = row.get("created_at");
        Ok(Some(Ledger::restore(
            Uuid::parse_str(&id_str).context("Invalid ledger ID")?,
            row.get("owner"),
            parse_timestamp(&created_at_str)?,
            row.get("balance_cents"),
            transactions,
        )))
    }

    /// List every ledger owner, alphabetically.
    pub async fn list_owners(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT owner FROM ledgers ORDER BY owner")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledgers")?;

        Ok(rows.iter().map(|row| row.get("owner")).collect())
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let ledger_id_str: String = row.get("ledger_id");
        let kind_str: String = row.get("kind");
        let created_at_str: String = row.get("created_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            ledger_id: Uuid::parse_str(&ledger_id_str).context("Invalid ledger ID")?,
            sequence: row.get("sequence"),
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            amount_cents: row.get("amount_cents"),
            description: row.get("description"),
            balance_after: row.get("balance_after_cents"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{Cents, IntegrityIssue};

    const OWNER: &str = "ada@example.com";

    async fn test_repository() -> (Repository, TempDir) {
        let temp = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", temp.path().join("repo.db").display());
        let repo = Repository::init(&url, &LedgerConfig::default()).await.unwrap();
        (repo, temp)
    }

    #[tokio::test]
    async fn test_stale_append_is_rejected() {
        let (repo, _temp) = test_repository().await;
        let ledger = Ledger::open(OWNER, 10_000).unwrap();
        assert!(repo.create_ledger(&ledger).await.unwrap());

        // Two writers plan against the same snapshot
        let first = ledger.plan(TransactionKind::Debit, 8_000, "purchase A").unwrap();
        let second = ledger.plan(TransactionKind::Debit, 8_000, "purchase B").unwrap();

        assert_eq!(repo.append_transaction(&first).await.unwrap(), AppendOutcome::Appended);
        assert_eq!(repo.append_transaction(&second).await.unwrap(), AppendOutcome::Conflict);

        let stored = repo.load_ledger(ledger.id).await.unwrap().expect("ledger exists");
        assert_eq!(stored.balance(), 2_000);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.transactions()[1].description, "purchase A");
        assert!(stored.verify().is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_owner_writes_nothing() {
        let (repo, _temp) = test_repository().await;
        let original = Ledger::open(OWNER, 10_000).unwrap();
        let duplicate = Ledger::open(OWNER, 99_999).unwrap();

        assert!(repo.create_ledger(&original).await.unwrap());
        assert!(!repo.create_ledger(&duplicate).await.unwrap());

        assert!(repo.load_ledger(duplicate.id).await.unwrap().is_none());
        let stored = repo.find_ledger_by_owner(OWNER).await.unwrap().expect("ledger exists");
        assert_eq!(stored.id, original.id);
        assert_eq!(stored.balance(), 10_000);
    }

    #[tokio::test]
    async fn test_unplanned_transaction_is_caught_by_verify() {
        let (repo, _temp) = test_repository().await;
        let ledger = Ledger::open(OWNER, 5_000).unwrap();
        assert!(repo.create_ledger(&ledger).await.unwrap());

        // Chain-consistent but blank, so only the integrity check can tell
        let mut forged = ledger.plan(TransactionKind::Credit, 1_000, "top-up").unwrap();
        forged.description = String::new();
        assert_eq!(repo.append_transaction(&forged).await.unwrap(), AppendOutcome::Appended);

        let stored = repo.load_ledger(ledger.id).await.unwrap().expect("ledger exists");
        let report = stored.verify();
        assert_eq!(report.issues, vec![IntegrityIssue::EmptyDescription { sequence: 2 }]);
    }

    #[tokio::test]
    async fn test_out_of_range_append_is_an_error() {
        let (repo, _temp) = test_repository().await;
        let ledger = Ledger::open(OWNER, 5_000).unwrap();
        assert!(repo.create_ledger(&ledger).await.unwrap());

        let mut broken = ledger.plan(TransactionKind::Debit, 1_000, "airtime").unwrap();
        broken.balance_after = Cents::MAX;
        assert!(repo.append_transaction(&broken).await.is_err());

        let stored = repo.load_ledger(ledger.id).await.unwrap().expect("ledger exists");
        assert_eq!(stored.balance(), 5_000);
        assert_eq!(stored.len(), 1);
    }
}
