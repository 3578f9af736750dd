use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Cents, LedgerId, Transaction};

/// Full statement of one ledger, oldest transaction first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub ledger_id: LedgerId,
    pub owner: String,
    pub exported_at: DateTime<Utc>,
    pub balance: Cents,
    pub transactions: Vec<Transaction>,
}

/// Writes ledger statements in CSV or JSON.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export a ledger's transactions as CSV. Returns the number of rows written.
    pub async fn export_statement_csv<W: Write>(
        &self,
        ledger_id: LedgerId,
        writer: W,
    ) -> Result<usize> {
        let ledger = self.service.get_ledger(ledger_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "created_at",
            "kind",
            "amount_cents",
            "description",
            "balance_after_cents",
        ])?;

        for transaction in ledger.transactions() {
            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.sequence.to_string(),
                transaction.created_at.to_rfc3339(),
                transaction.kind.to_string(),
                transaction.amount_cents.to_string(),
                transaction.description.clone(),
                transaction.balance_after.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(ledger.len())
    }

    /// Export a ledger as a JSON statement document.
    pub async fn export_statement_json<W: Write>(
        &self,
        ledger_id: LedgerId,
        writer: W,
    ) -> Result<usize> {
        let ledger = self.service.get_ledger(ledger_id).await?;
        let statement = Statement {
            ledger_id: ledger.id,
            owner: ledger.owner.clone(),
            exported_at: Utc::now(),
            balance: ledger.balance(),
            transactions: ledger.transactions().to_vec(),
        };

        serde_json::to_writer_pretty(writer, &statement)?;
        Ok(statement.transactions.len())
    }
}
