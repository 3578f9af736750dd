use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::{Cents, Transaction, TransactionKind};

pub type LedgerId = Uuid;

/// Number of transactions returned by `recent_history` when the caller has no preference.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Description of the credit every new ledger is seeded with.
pub const WELCOME_BONUS_DESCRIPTION: &str = "Welcome bonus";

/// A wallet's balance together with the append-only log that produced it.
///
/// `balance` and `transactions` are not writable from outside the crate: the
/// only way to grow a ledger is `plan` followed by `commit`, which keeps
/// `balance == Σ credits − Σ debits` at every step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub id: LedgerId,
    /// Identity of the owning account (one ledger per account)
    pub owner: String,
    pub created_at: DateTime<Utc>,
    balance: Cents,
    transactions: Vec<Transaction>,
}

/// Aggregates derived from the log on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_credited: Cents,
    pub total_debited: Cents,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_transactions: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostingError {
    #[error("amount must be greater than zero (got {0})")]
    NonPositiveAmount(Cents),

    #[error("description must not be empty")]
    EmptyDescription,

    #[error("insufficient balance: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Cents, requested: Cents },

    #[error("amount {0} would overflow the balance")]
    Overflow(Cents),

    #[error("transaction {sequence} does not follow the ledger head {head}")]
    OutOfOrder { head: i64, sequence: i64 },
}

impl Ledger {
    /// Create a ledger for `owner`, seeded with a welcome credit so the
    /// balance and the log agree from the first instant.
    /// A zero bonus opens an empty ledger.
    pub fn open(owner: impl Into<String>, welcome_bonus: Cents) -> Result<Self, PostingError> {
        let mut ledger = Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            created_at: Utc::now(),
            balance: 0,
            transactions: Vec::new(),
        };

        if welcome_bonus != 0 {
            let seed = ledger.plan(
                TransactionKind::Credit,
                welcome_bonus,
                WELCOME_BONUS_DESCRIPTION,
            )?;
            ledger.commit(seed)?;
        }

        Ok(ledger)
    }

    /// Rebuild a ledger from stored state. Consistency is checked by `verify`,
    /// not here, so a damaged store can still be inspected.
    pub(crate) fn restore(
        id: LedgerId,
        owner: String,
        created_at: DateTime<Utc>,
        balance: Cents,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            id,
            owner,
            created_at,
            balance,
            transactions,
        }
    }

    pub fn balance(&self) -> Cents {
        self.balance
    }

    /// All transactions in insertion order (oldest first).
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Sequence number of the last recorded transaction, 0 for an empty log.
    pub fn head_sequence(&self) -> i64 {
        self.transactions.last().map(|t| t.sequence).unwrap_or(0)
    }

    /// Compute the transaction that applying `kind`/`amount` would record,
    /// without touching the ledger.
    pub fn plan(
        &self,
        kind: TransactionKind,
        amount_cents: Cents,
        description: impl Into<String>,
    ) -> Result<Transaction, PostingError> {
        if amount_cents <= 0 {
            return Err(PostingError::NonPositiveAmount(amount_cents));
        }

        let description = description.into();
        let description = description.trim();
        if description.is_empty() {
            return Err(PostingError::EmptyDescription);
        }

        let candidate = self
            .balance
            .checked_add(kind.delta(amount_cents))
            .ok_or(PostingError::Overflow(amount_cents))?;

        if candidate < 0 {
            return Err(PostingError::InsufficientFunds {
                balance: self.balance,
                requested: amount_cents,
            });
        }

        Ok(Transaction::new(
            self.id,
            self.head_sequence() + 1,
            kind,
            amount_cents,
            description.to_string(),
            candidate,
        ))
    }

    /// Append a planned transaction. It must have been planned against the
    /// current head of this ledger.
    pub(crate) fn commit(&mut self, transaction: Transaction) -> Result<(), PostingError> {
        let head = self.head_sequence();
        if transaction.ledger_id != self.id
            || transaction.sequence != head + 1
            || transaction.balance_before() != Some(self.balance)
        {
            return Err(PostingError::OutOfOrder {
                head,
                sequence: transaction.sequence,
            });
        }

        self.balance = transaction.balance_after;
        self.transactions.push(transaction);
        Ok(())
    }

    /// Transactions ordered newest first. Ties on `created_at` are broken by sequence.
    fn newest_first(&self) -> Vec<&Transaction> {
        let mut sorted: Vec<&Transaction> = self.transactions.iter().collect();
        sorted.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });
        sorted
    }

    /// The `limit` most recent transactions, newest first.
    pub fn recent_history(&self, limit: usize) -> Vec<Transaction> {
        self.newest_first()
            .into_iter()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn compute_totals(&self) -> Totals {
        let sum_of = |kind: TransactionKind| -> Cents {
            self.transactions
                .iter()
                .filter(|t| t.kind == kind)
                .map(|t| t.amount_cents)
                .sum()
        };

        Totals {
            total_credited: sum_of(TransactionKind::Credit),
            total_debited: sum_of(TransactionKind::Debit),
            count: self.transactions.len(),
        }
    }

    /// Slice the newest-first history into pages. `page` and `page_size`
    /// start at 1; smaller values are clamped. Pages past the end are empty.
    pub fn page(&self, page: usize, page_size: usize) -> HistoryPage {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total_transactions = self.transactions.len();
        let total_pages = total_transactions.div_ceil(page_size);

        let transactions = self
            .newest_first()
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();

        HistoryPage {
            transactions,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_transactions,
                has_next_page: page < total_pages,
                has_prev_page: page > 1,
            },
        }
    }

    /// Re-derive the balance from the log and report every inconsistency found.
    pub fn verify(&self) -> IntegrityReport {
        let mut issues = Vec::new();
        let mut running: Cents = 0;

        for (index, tx) in self.transactions.iter().enumerate() {
            let expected_sequence = index as i64 + 1;
            if tx.sequence != expected_sequence {
                issues.push(IntegrityIssue::SequenceGap {
                    expected: expected_sequence,
                    found: tx.sequence,
                });
            }

            if tx.amount_cents <= 0 {
                issues.push(IntegrityIssue::NonPositiveAmount {
                    sequence: tx.sequence,
                    amount: tx.amount_cents,
                });
            }

            if tx.description.trim().is_empty() {
                issues.push(IntegrityIssue::EmptyDescription {
                    sequence: tx.sequence,
                });
            }

            let next = match tx.kind {
                TransactionKind::Credit => running.checked_add(tx.amount_cents),
                TransactionKind::Debit => running.checked_sub(tx.amount_cents),
            };
            let Some(next) = next else {
                issues.push(IntegrityIssue::Overflow {
                    sequence: tx.sequence,
                });
                break;
            };
            running = next;

            if tx.balance_after != running {
                issues.push(IntegrityIssue::BrokenChain {
                    sequence: tx.sequence,
                    expected: running,
                    recorded: tx.balance_after,
                });
            }

            if running < 0 {
                issues.push(IntegrityIssue::NegativeBalance {
                    sequence: tx.sequence,
                    balance: running,
                });
            }
        }

        if running != self.balance {
            issues.push(IntegrityIssue::BalanceMismatch {
                stored: self.balance,
                computed: running,
            });
        }

        IntegrityReport {
            ledger_id: self.id,
            transaction_count: self.transactions.len(),
            stored_balance: self.balance,
            computed_balance: running,
            issues,
        }
    }
}

/// Result of re-deriving a ledger's balance from its log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub ledger_id: LedgerId,
    pub transaction_count: usize,
    pub stored_balance: Cents,
    pub computed_balance: Cents,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntegrityIssue {
    BalanceMismatch { stored: Cents, computed: Cents },
    BrokenChain { sequence: i64, expected: Cents, recorded: Cents },
    NegativeBalance { sequence: i64, balance: Cents },
    SequenceGap { expected: i64, found: i64 },
    NonPositiveAmount { sequence: i64, amount: Cents },
    EmptyDescription { sequence: i64 },
    /// Replaying the log overflowed; later transactions were not checked
    Overflow { sequence: i64 },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::BalanceMismatch { stored, computed } => write!(
                f,
                "stored balance {} does not match computed balance {}",
                stored, computed
            ),
            IntegrityIssue::BrokenChain {
                sequence,
                expected,
                recorded,
            } => write!(
                f,
                "transaction {} records balance {} but the log implies {}",
                sequence, recorded, expected
            ),
            IntegrityIssue::NegativeBalance { sequence, balance } => write!(
                f,
                "balance went negative ({}) at transaction {}",
                balance, sequence
            ),
            IntegrityIssue::SequenceGap { expected, found } => {
                write!(f, "expected sequence {}, found {}", expected, found)
            }
            IntegrityIssue::NonPositiveAmount { sequence, amount } => {
                write!(f, "transaction {} has non-positive amount {}", sequence, amount)
            }
            IntegrityIssue::EmptyDescription { sequence } => {
                write!(f, "transaction {} has no description", sequence)
            }
            IntegrityIssue::Overflow { sequence } => {
                write!(f, "balance overflows at transaction {}", sequence)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn ledger_with(bonus: Cents) -> Ledger {
        Ledger::open("ada@example.com", bonus).unwrap()
    }

    fn apply(ledger: &mut Ledger, kind: TransactionKind, amount: Cents, desc: &str) -> Transaction {
        let tx = ledger.plan(kind, amount, desc).unwrap();
        ledger.commit(tx.clone()).unwrap();
        tx
    }

    #[test]
    fn test_open_seeds_welcome_bonus() {
        let ledger = ledger_with(5000);

        assert_eq!(ledger.balance(), 5000);
        assert_eq!(ledger.len(), 1);
        let seed = &ledger.transactions()[0];
        assert_eq!(seed.kind, TransactionKind::Credit);
        assert_eq!(seed.amount_cents, 5000);
        assert_eq!(seed.description, "Welcome bonus");
        assert_eq!(seed.balance_after, 5000);
        assert_eq!(seed.sequence, 1);
    }

    #[test]
    fn test_open_without_bonus_is_empty() {
        let ledger = ledger_with(0);
        assert_eq!(ledger.balance(), 0);
        assert!(ledger.is_empty());
        assert_eq!(ledger.head_sequence(), 0);
    }

    #[test]
    fn test_plan_credit_computes_balance_after() {
        let ledger = ledger_with(5000);
        let tx = ledger.plan(TransactionKind::Credit, 1000, "top-up").unwrap();

        assert_eq!(tx.balance_after, 6000);
        assert_eq!(tx.sequence, 2);
        // Planning alone leaves the ledger untouched
        assert_eq!(ledger.balance(), 5000);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_plan_rejects_overdraft() {
        let ledger = ledger_with(6000);
        let result = ledger.plan(TransactionKind::Debit, 7000, "purchase");

        assert_eq!(
            result,
            Err(PostingError::InsufficientFunds {
                balance: 6000,
                requested: 7000
            })
        );
    }

    #[test]
    fn test_plan_allows_debit_to_exactly_zero() {
        let ledger = ledger_with(5000);
        let tx = ledger.plan(TransactionKind::Debit, 5000, "everything").unwrap();
        assert_eq!(tx.balance_after, 0);
    }

    #[test]
    fn test_plan_validates_input() {
        let ledger = ledger_with(5000);

        assert_eq!(
            ledger.plan(TransactionKind::Credit, 0, "zero"),
            Err(PostingError::NonPositiveAmount(0))
        );
        assert_eq!(
            ledger.plan(TransactionKind::Debit, -10, "negative"),
            Err(PostingError::NonPositiveAmount(-10))
        );
        assert_eq!(
            ledger.plan(TransactionKind::Credit, 10, "   "),
            Err(PostingError::EmptyDescription)
        );
        assert_eq!(
            ledger.plan(TransactionKind::Credit, Cents::MAX, "too much"),
            Err(PostingError::Overflow(Cents::MAX))
        );
    }

    #[test]
    fn test_commit_rejects_stale_plan() {
        let mut ledger = ledger_with(5000);
        let first = ledger.plan(TransactionKind::Debit, 100, "a").unwrap();
        let stale = ledger.plan(TransactionKind::Debit, 100, "b").unwrap();

        ledger.commit(first).unwrap();
        assert!(matches!(
            ledger.commit(stale),
            Err(PostingError::OutOfOrder { head: 2, sequence: 2 })
        ));
        assert_eq!(ledger.balance(), 4900);
    }

    #[test]
    fn test_balance_matches_log_after_every_step() {
        let mut ledger = ledger_with(5000);
        let steps = [
            (TransactionKind::Credit, 1000),
            (TransactionKind::Debit, 200),
            (TransactionKind::Debit, 5800),
            (TransactionKind::Credit, 1),
        ];

        for (kind, amount) in steps {
            apply(&mut ledger, kind, amount, "step");
            let totals = ledger.compute_totals();
            assert_eq!(ledger.balance(), totals.total_credited - totals.total_debited);
            assert!(ledger.balance() >= 0);
            assert!(ledger.verify().is_ok());
        }
        assert_eq!(ledger.balance(), 1);
    }

    #[test]
    fn test_compute_totals() {
        let mut ledger = ledger_with(5000);
        apply(&mut ledger, TransactionKind::Credit, 1000, "top-up");
        apply(&mut ledger, TransactionKind::Debit, 200, "airtime");

        assert_eq!(
            ledger.compute_totals(),
            Totals {
                total_credited: 6000,
                total_debited: 200,
                count: 3
            }
        );
    }

    #[test]
    fn test_recent_history_newest_first() {
        let mut ledger = ledger_with(5000);
        for i in 0..12 {
            apply(&mut ledger, TransactionKind::Debit, 10, &format!("debit {}", i));
        }

        let recent = ledger.recent_history(DEFAULT_HISTORY_LIMIT);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].sequence, 13);
        assert_eq!(recent[9].sequence, 4);
        // Reading again gives the same answer
        assert_eq!(recent, ledger.recent_history(DEFAULT_HISTORY_LIMIT));
        assert_eq!(ledger.recent_history(100).len(), 13);
    }

    #[test]
    fn test_identical_timestamps_order_by_sequence() {
        let mut ledger = ledger_with(5000);
        let a = ledger.plan(TransactionKind::Debit, 1, "a").unwrap();
        let stamp = a.created_at;
        ledger.commit(a).unwrap();
        let mut b = ledger.plan(TransactionKind::Debit, 1, "b").unwrap();
        b.created_at = stamp;
        ledger.commit(b).unwrap();

        let recent = ledger.recent_history(2);
        assert_eq!(recent[0].description, "b");
        assert_eq!(recent[1].description, "a");
    }

    #[test]
    fn test_history_orders_by_created_at() {
        let mut ledger = ledger_with(5000);
        let mut backdated = ledger.plan(TransactionKind::Debit, 1, "backdated").unwrap();
        backdated.created_at = ledger.created_at - Duration::days(1);
        ledger.commit(backdated).unwrap();

        let recent = ledger.recent_history(2);
        assert_eq!(recent[0].description, "Welcome bonus");
        assert_eq!(recent[1].description, "backdated");
    }

    #[test]
    fn test_page_first_of_two() {
        let mut ledger = ledger_with(5000);
        apply(&mut ledger, TransactionKind::Credit, 1000, "top-up");

        let page = ledger.page(1, 1);
        assert_eq!(page.transactions.len(), 1);
        assert_eq!(page.transactions[0].description, "top-up");
        assert_eq!(
            page.pagination,
            Pagination {
                current_page: 1,
                total_pages: 2,
                total_transactions: 2,
                has_next_page: true,
                has_prev_page: false,
            }
        );

        let second = ledger.page(2, 1);
        assert_eq!(second.transactions[0].description, "Welcome bonus");
        assert!(!second.pagination.has_next_page);
        assert!(second.pagination.has_prev_page);
    }

    #[test]
    fn test_page_clamps_and_overflows() {
        let mut ledger = ledger_with(5000);
        apply(&mut ledger, TransactionKind::Credit, 1000, "top-up");

        let clamped = ledger.page(0, 0);
        assert_eq!(clamped.pagination.current_page, 1);
        assert_eq!(clamped.pagination.total_pages, 2);
        assert_eq!(clamped.transactions.len(), 1);

        let beyond = ledger.page(5, 10);
        assert!(beyond.transactions.is_empty());
        assert_eq!(beyond.pagination.total_pages, 1);
        assert!(!beyond.pagination.has_next_page);
        assert!(beyond.pagination.has_prev_page);
    }

    #[test]
    fn test_page_on_empty_ledger() {
        let ledger = ledger_with(0);
        let page = ledger.page(1, 10);
        assert!(page.transactions.is_empty());
        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next_page);
    }

    #[test]
    fn test_verify_detects_tampering() {
        let ledger = ledger_with(5000);
        let mut transactions = ledger.transactions().to_vec();
        transactions[0].balance_after = 4000;
        let damaged = Ledger::restore(ledger.id, ledger.owner.clone(), ledger.created_at, 7000, transactions);

        let report = damaged.verify();
        assert!(!report.is_ok());
        assert!(report.issues.contains(&IntegrityIssue::BrokenChain {
            sequence: 1,
            expected: 5000,
            recorded: 4000
        }));
        assert!(report.issues.contains(&IntegrityIssue::BalanceMismatch {
            stored: 7000,
            computed: 5000
        }));
    }

    #[test]
    fn test_verify_flags_empty_description() {
        let ledger = ledger_with(5000);
        let mut transactions = ledger.transactions().to_vec();
        transactions[0].description = String::new();
        let damaged = Ledger::restore(ledger.id, ledger.owner.clone(), ledger.created_at, 5000, transactions);

        let report = damaged.verify();
        assert_eq!(report.issues, vec![IntegrityIssue::EmptyDescription { sequence: 1 }]);
    }

    #[test]
    fn test_verify_reports_overflow_instead_of_panicking() {
        let mut ledger = ledger_with(Cents::MAX);
        apply(&mut ledger, TransactionKind::Debit, 1, "airtime");
        let mut transactions = ledger.transactions().to_vec();
        // Stored debit rewritten as a credit pushes the replay past Cents::MAX
        transactions[1].kind = TransactionKind::Credit;
        let damaged = Ledger::restore(ledger.id, ledger.owner.clone(), ledger.created_at, 0, transactions);

        let report = damaged.verify();
        assert!(report.issues.contains(&IntegrityIssue::Overflow { sequence: 2 }));
        assert_eq!(report.computed_balance, Cents::MAX);
    }
}
