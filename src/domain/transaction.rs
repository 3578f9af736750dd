use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, LedgerId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money entering the wallet (top-ups, bonuses)
    Credit,
    /// Money leaving the wallet (purchases)
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "credit" => Some(TransactionKind::Credit),
            "debit" => Some(TransactionKind::Debit),
            _ => None,
        }
    }

    /// Signed effect of an amount of this kind on the balance.
    pub fn delta(&self, amount_cents: Cents) -> Cents {
        match self {
            TransactionKind::Credit => amount_cents,
            TransactionKind::Debit => -amount_cents,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable credit or debit, with the balance it left behind.
///
/// Transactions are only produced by [`Ledger::plan`](super::Ledger::plan),
/// which derives `balance_after` from the ledger's current balance, or
/// rebuilt from storage. Fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub(crate) id: TransactionId,
    pub(crate) ledger_id: LedgerId,
    /// Position in the ledger's log, starting at 1
    pub(crate) sequence: i64,
    pub(crate) kind: TransactionKind,
    /// Always positive
    pub(crate) amount_cents: Cents,
    pub(crate) description: String,
    pub(crate) balance_after: Cents,
    pub(crate) created_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn new(
        ledger_id: LedgerId,
        sequence: i64,
        kind: TransactionKind,
        amount_cents: Cents,
        description: String,
        balance_after: Cents,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ledger_id,
            sequence,
            kind,
            amount_cents,
            description,
            balance_after,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount_cents(&self) -> Cents {
        self.amount_cents
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn balance_after(&self) -> Cents {
        self.balance_after
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_credit(&self) -> bool {
        self.kind == TransactionKind::Credit
    }

    pub fn is_debit(&self) -> bool {
        self.kind == TransactionKind::Debit
    }

    /// Signed change this transaction made to the balance.
    pub fn delta(&self) -> Cents {
        self.kind.delta(self.amount_cents)
    }

    /// Balance immediately before this transaction was applied, or `None`
    /// if the recorded amounts don't fit in a `Cents`.
    pub fn balance_before(&self) -> Option<Cents> {
        match self.kind {
            TransactionKind::Credit => self.balance_after.checked_sub(self.amount_cents),
            TransactionKind::Debit => self.balance_after.checked_add(self.amount_cents),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [TransactionKind::Credit, TransactionKind::Debit] {
            assert_eq!(TransactionKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::from_str("DEBIT"), Some(TransactionKind::Debit));
        assert_eq!(TransactionKind::from_str("refund"), None);
    }

    #[test]
    fn test_balance_before() {
        let ledger = Uuid::new_v4();
        let credit = Transaction::new(ledger, 2, TransactionKind::Credit, 1000, "top-up".into(), 6000);
        let debit = Transaction::new(ledger, 3, TransactionKind::Debit, 200, "airtime".into(), 5800);

        assert_eq!(credit.balance_before(), Some(5000));
        assert_eq!(debit.balance_before(), Some(6000));
        assert_eq!(debit.delta(), -200);
    }

    #[test]
    fn test_balance_before_out_of_range() {
        let ledger = Uuid::new_v4();
        let debit = Transaction::new(ledger, 2, TransactionKind::Debit, Cents::MAX, "x".into(), 10);
        assert_eq!(debit.balance_before(), None);
    }

    #[test]
    fn test_serializes_camel_case() {
        let tx = Transaction::new(
            Uuid::new_v4(),
            1,
            TransactionKind::Credit,
            500_000,
            "Welcome bonus".into(),
            500_000,
        );
        let json = serde_json::to_value(&tx).unwrap();

        assert_eq!(json["kind"], "credit");
        assert_eq!(json["balanceAfter"], 500_000);
        assert_eq!(json["amountCents"], 500_000);
        assert!(json.get("createdAt").is_some());
    }
}
