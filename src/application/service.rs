use serde::Serialize;

use crate::config::LedgerConfig;
use crate::domain::{
    Cents, HistoryPage, IntegrityReport, Ledger, LedgerId, Totals, Transaction, TransactionKind,
};
use crate::storage::{AppendOutcome, Repository};

use super::{AirtimeRequest, AppError, FundingReceipt, LedgerLocks, PurchaseReceipt};

/// Description recorded on wallet top-ups.
pub const TOP_UP_DESCRIPTION: &str = "Wallet top-up";

/// Application service and the only code path that mutates a ledger.
/// This is the primary interface for any client (CLI, HTTP handler, etc.).
pub struct LedgerService {
    repo: Repository,
    locks: LedgerLocks,
    config: LedgerConfig,
}

/// Point-in-time view of a wallet, read from a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub ledger_id: LedgerId,
    pub balance: Cents,
    pub total_spent: Cents,
    pub total_received: Cents,
    pub total_transactions: usize,
    pub recent_transactions: Vec<Transaction>,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository, config: LedgerConfig) -> Self {
        Self {
            repo,
            locks: LedgerLocks::new(config.lock_timeout),
            config,
        }
    }

    /// Initialize a database at the given path, creating it if needed.
    pub async fn init(database_path: &str, config: LedgerConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url, &config).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: LedgerConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url, &config).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================
    // Ledger lifecycle
    // ========================

    /// Open the ledger for a new account, seeded with the welcome bonus.
    pub async fn open_ledger(&self, owner: &str) -> Result<Ledger, AppError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(AppError::InvalidOwner("Owner must not be empty".to_string()));
        }

        let ledger = Ledger::open(owner, self.config.welcome_bonus_cents)?;

        if !self.repo.create_ledger(&ledger).await? {
            return Err(AppError::LedgerAlreadyExists(owner.to_string()));
        }

        tracing::info!(
            ledger_id = %ledger.id,
            owner,
            balance = ledger.balance(),
            "opened ledger"
        );
        Ok(ledger)
    }

    /// Load a ledger snapshot by ID.
    pub async fn get_ledger(&self, id: LedgerId) -> Result<Ledger, AppError> {
        self.repo
            .load_ledger(id)
            .await?
            .ok_or_else(|| AppError::LedgerNotFound(id.to_string()))
    }

    /// Load the ledger belonging to `owner`.
    pub async fn find_ledger_by_owner(&self, owner: &str) -> Result<Ledger, AppError> {
        self.repo
            .find_ledger_by_owner(owner.trim())
            .await?
            .ok_or_else(|| AppError::LedgerNotFound(owner.to_string()))
    }

    pub async fn list_owners(&self) -> Result<Vec<String>, AppError> {
        Ok(self.repo.list_owners().await?)
    }

    // ========================
    // Mutations
    // ========================

    /// Record a credit or debit and move the balance, as one atomic unit.
    ///
    /// Mutations of the same ledger are serialized: the balance is read,
    /// checked and written while holding that ledger's lock, and the write
    /// itself is conditional on the stored head not having moved.
    pub async fn apply_transaction(
        &self,
        ledger_id: LedgerId,
        kind: TransactionKind,
        amount_cents: Cents,
        description: &str,
    ) -> Result<Transaction, AppError> {
        if amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ));
        }
        if description.trim().is_empty() {
            return Err(AppError::InvalidDescription(
                "Description is required".to_string(),
            ));
        }

        let _guard = self.locks.acquire(ledger_id).await?;

        let ledger = self.get_ledger(ledger_id).await?;
        let transaction = match ledger.plan(kind, amount_cents, description) {
            Ok(transaction) => transaction,
            Err(err) => {
                tracing::warn!(%ledger_id, %kind, amount_cents, balance = ledger.balance(), "rejected transaction: {}", err);
                return Err(err.into());
            }
        };

        match self.repo.append_transaction(&transaction).await {
            Ok(AppendOutcome::Appended) => {}
            Ok(AppendOutcome::Conflict) => {
                tracing::warn!(%ledger_id, sequence = transaction.sequence, "ledger head moved during append");
                return Err(AppError::ConcurrentModification(ledger_id));
            }
            Err(err) => {
                tracing::error!(%ledger_id, "failed to persist transaction: {:#}", err);
                return Err(AppError::Persistence(err));
            }
        }

        tracing::info!(
            %ledger_id,
            transaction_id = %transaction.id,
            %kind,
            amount_cents,
            balance_after = transaction.balance_after,
            "applied transaction"
        );
        Ok(transaction)
    }

    /// Add money to a ledger. Never fails for lack of funds.
    pub async fn credit(
        &self,
        ledger_id: LedgerId,
        amount_cents: Cents,
        description: &str,
    ) -> Result<Transaction, AppError> {
        self.apply_transaction(ledger_id, TransactionKind::Credit, amount_cents, description)
            .await
    }

    /// Take money out of a ledger. Every spend feature goes through here.
    pub async fn debit(
        &self,
        ledger_id: LedgerId,
        amount_cents: Cents,
        description: &str,
    ) -> Result<Transaction, AppError> {
        self.apply_transaction(ledger_id, TransactionKind::Debit, amount_cents, description)
            .await
    }

    /// Top up a wallet.
    pub async fn add_funds(
        &self,
        ledger_id: LedgerId,
        amount_cents: Cents,
    ) -> Result<FundingReceipt, AppError> {
        let transaction = self
            .credit(ledger_id, amount_cents, TOP_UP_DESCRIPTION)
            .await?;

        // Planning already checked this sum, so undoing it cannot overflow
        Ok(FundingReceipt {
            amount_cents,
            previous_balance: transaction.balance_after - amount_cents,
            new_balance: transaction.balance_after,
            transaction,
        })
    }

    /// Buy airtime, paying from the wallet.
    pub async fn purchase_airtime(
        &self,
        ledger_id: LedgerId,
        request: AirtimeRequest,
    ) -> Result<PurchaseReceipt, AppError> {
        request.validate()?;

        let transaction = self
            .debit(ledger_id, request.amount_cents, &request.description())
            .await?;

        tracing::info!(
            %ledger_id,
            phone_number = request.phone_number.trim(),
            network = request.network.trim(),
            amount_cents = request.amount_cents,
            new_balance = transaction.balance_after,
            "airtime purchase successful"
        );

        Ok(PurchaseReceipt {
            phone_number: request.phone_number.trim().to_string(),
            network: request.network.trim().to_string(),
            amount_cents: request.amount_cents,
            transaction_id: transaction.id,
            previous_balance: transaction.balance_after + request.amount_cents,
            new_balance: transaction.balance_after,
            transaction,
        })
    }

    // ========================
    // Reads
    // ========================

    /// Transactions newest first, one page at a time.
    pub async fn history(
        &self,
        ledger_id: LedgerId,
        page: usize,
        page_size: usize,
    ) -> Result<HistoryPage, AppError> {
        let ledger = self.get_ledger(ledger_id).await?;
        Ok(ledger.page(page, page_size))
    }

    /// Balance, totals and the latest few transactions.
    pub async fn summary(&self, ledger_id: LedgerId) -> Result<LedgerSummary, AppError> {
        let ledger = self.get_ledger(ledger_id).await?;
        let totals = ledger.compute_totals();

        Ok(LedgerSummary {
            ledger_id,
            balance: ledger.balance(),
            total_spent: totals.total_debited,
            total_received: totals.total_credited,
            total_transactions: totals.count,
            recent_transactions: ledger.recent_history(self.config.summary_recent_limit),
        })
    }

    /// The most recent transactions, newest first.
    pub async fn recent_history(
        &self,
        ledger_id: LedgerId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, AppError> {
        let ledger = self.get_ledger(ledger_id).await?;
        Ok(ledger.recent_history(limit.unwrap_or(self.config.default_history_limit)))
    }

    pub async fn totals(&self, ledger_id: LedgerId) -> Result<Totals, AppError> {
        Ok(self.get_ledger(ledger_id).await?.compute_totals())
    }

    /// Re-derive the balance from the stored log and report any drift.
    pub async fn check_integrity(&self, ledger_id: LedgerId) -> Result<IntegrityReport, AppError> {
        let report = self.get_ledger(ledger_id).await?.verify();
        if !report.is_ok() {
            tracing::error!(%ledger_id, issues = report.issues.len(), "ledger failed integrity check");
        }
        Ok(report)
    }
}
