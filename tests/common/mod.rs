// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use purse::LedgerConfig;
use purse::application::LedgerService;
use purse::domain::{Cents, Ledger};
use tempfile::TempDir;

pub const OWNER: &str = "ada@example.com";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    test_service_with(LedgerConfig::default()).await
}

/// Helper to create a test service with custom settings
pub async fn test_service_with(config: LedgerConfig) -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&db_path(&temp_dir), config).await?;
    Ok((service, temp_dir))
}

/// Path of the database file inside a test directory
pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_str().unwrap().to_string()
}

/// Open a ledger whose welcome bonus is exactly `balance`
pub async fn open_with_balance(balance: Cents) -> Result<(LedgerService, Ledger, TempDir)> {
    let (service, temp) = test_service_with(LedgerConfig::default().with_welcome_bonus(balance)).await?;
    let ledger = service.open_ledger(OWNER).await?;
    Ok((service, ledger, temp))
}

/// Assert the stored balance equals Σ credits − Σ debits and is non-negative
pub fn assert_consistent(ledger: &Ledger) {
    let totals = ledger.compute_totals();
    assert_eq!(
        ledger.balance(),
        totals.total_credited - totals.total_debited,
        "balance must equal the sum of recorded deltas"
    );
    assert!(ledger.balance() >= 0, "balance must never be negative");
    assert!(ledger.verify().is_ok(), "integrity issues: {:?}", ledger.verify().issues);
}
