use serde::{Deserialize, Serialize};

use crate::domain::{Cents, Transaction, TransactionId};

use super::AppError;

/// Request to buy airtime for a phone number, paid from the wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirtimeRequest {
    pub phone_number: String,
    pub amount_cents: Cents,
    pub network: String,
}

impl AirtimeRequest {
    pub fn new(
        phone_number: impl Into<String>,
        amount_cents: Cents,
        network: impl Into<String>,
    ) -> Self {
        Self {
            phone_number: phone_number.into(),
            amount_cents,
            network: network.into(),
        }
    }

    /// Check the request before any money moves.
    pub fn validate(&self) -> Result<(), AppError> {
        let phone = self.phone_number.trim();
        let network = self.network.trim();

        if phone.is_empty() || network.is_empty() {
            return Err(AppError::InvalidPurchase(
                "Please provide phone number, amount, and network".to_string(),
            ));
        }
        if self.amount_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ));
        }
        if !is_valid_phone_number(phone) {
            return Err(AppError::InvalidPurchase(
                "Please provide a valid phone number".to_string(),
            ));
        }
        Ok(())
    }

    /// Description recorded on the debit.
    pub fn description(&self) -> String {
        format!(
            "Airtime purchase for {} ({})",
            self.phone_number.trim(),
            self.network.trim()
        )
    }
}

/// Digits plus the usual separators: `+`, `-`, parentheses and whitespace.
fn is_valid_phone_number(phone: &str) -> bool {
    !phone.is_empty()
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')') || c.is_whitespace())
}

/// Outcome of a successful airtime purchase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub phone_number: String,
    pub network: String,
    pub amount_cents: Cents,
    pub transaction_id: TransactionId,
    pub previous_balance: Cents,
    pub new_balance: Cents,
    pub transaction: Transaction,
}

/// Outcome of a wallet top-up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingReceipt {
    pub amount_cents: Cents,
    pub previous_balance: Cents,
    pub new_balance: Cents,
    pub transaction: Transaction,
}
