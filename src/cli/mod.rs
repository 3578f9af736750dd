use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::application::{AirtimeRequest, LedgerService};
use crate::config::LedgerConfig;
use crate::domain::{format_cents, parse_cents, Ledger, Transaction};
use crate::logging::LogFormat;

/// Purse - wallet ledger
#[derive(Parser)]
#[command(name = "purse")]
#[command(about = "A wallet ledger with an atomic, append-only credit/debit history")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "PURSE_DATABASE", default_value = "purse.db")]
    pub database: String,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Welcome bonus credited to newly opened ledgers (e.g., "5000.00")
    #[arg(long, env = "PURSE_WELCOME_BONUS")]
    pub welcome_bonus: Option<String>,

    /// Maximum time a mutation waits for its ledger lock, in milliseconds
    #[arg(long, env = "PURSE_LOCK_TIMEOUT_MS")]
    pub lock_timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Open a ledger for an account, seeded with the welcome bonus
    Open {
        /// Account identity (e.g., an email address)
        owner: String,
    },

    /// List all ledger owners
    Ledgers,

    /// Credit a ledger
    Credit {
        owner: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Description of the credit
        #[arg(short, long)]
        description: String,
    },

    /// Debit a ledger (fails if the balance would go negative)
    Debit {
        owner: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Description of the debit
        #[arg(short, long)]
        description: String,
    },

    /// Add funds to a wallet
    TopUp {
        owner: String,

        /// Amount (e.g., "1000")
        amount: String,

        /// Print the receipt as JSON
        #[arg(long)]
        json: bool,
    },

    /// Buy airtime, paid from the wallet
    Airtime {
        owner: String,

        /// Amount (e.g., "200")
        amount: String,

        /// Phone number to recharge
        #[arg(long)]
        phone: String,

        /// Mobile network (e.g., MTN, Glo, Airtel)
        #[arg(long)]
        network: String,

        /// Print the receipt as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show transaction history, newest first
    History {
        owner: String,

        /// Page number (starting at 1)
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Transactions per page
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show balance and totals
    Summary {
        owner: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify that a ledger's balance matches its history
    Check { owner: String },

    /// Export a ledger statement
    Export {
        owner: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl Cli {
    /// Build the service configuration from defaults plus command-line overrides.
    pub fn config(&self) -> Result<LedgerConfig> {
        let mut config = LedgerConfig::default();
        if let Some(bonus) = &self.welcome_bonus {
            config = config.with_welcome_bonus(
                parse_cents(bonus).context("Invalid welcome bonus. Use '5000.00' or '5000'")?,
            );
        }
        if let Some(ms) = self.lock_timeout_ms {
            config = config.with_lock_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config()?;
        let database = self.database;
        let connect = || LedgerService::connect(&database, config.clone());

        match self.command {
            Commands::Init => {
                LedgerService::init(&database, config.clone()).await?;
                println!("Database initialized: {}", database);
            }

            Commands::Open { owner } => {
                let service = connect().await?;
                let ledger = service.open_ledger(&owner).await?;
                println!(
                    "Opened ledger for {} ({}) with balance {}",
                    ledger.owner,
                    ledger.id,
                    format_cents(ledger.balance())
                );
            }

            Commands::Ledgers => {
                let service = connect().await?;
                let owners = service.list_owners().await?;
                if owners.is_empty() {
                    println!("No ledgers found.");
                }
                for owner in owners {
                    println!("{}", owner);
                }
            }

            Commands::Credit {
                owner,
                amount,
                description,
            } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                let tx = service
                    .credit(ledger.id, parse_amount(&amount)?, &description)
                    .await?;
                print_applied(&tx);
            }

            Commands::Debit {
                owner,
                amount,
                description,
            } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                let tx = service
                    .debit(ledger.id, parse_amount(&amount)?, &description)
                    .await?;
                print_applied(&tx);
            }

            Commands::TopUp {
                owner,
                amount,
                json,
            } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                let receipt = service.add_funds(ledger.id, parse_amount(&amount)?).await?;
                if json {
                    print_json(&receipt)?;
                } else {
                    println!("Funds added successfully");
                    println!("  Amount:           {}", format_cents(receipt.amount_cents));
                    println!("  Previous balance: {}", format_cents(receipt.previous_balance));
                    println!("  New balance:      {}", format_cents(receipt.new_balance));
                    println!("  Transaction:      {}", receipt.transaction.id);
                }
            }

            Commands::Airtime {
                owner,
                amount,
                phone,
                network,
                json,
            } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                let request = AirtimeRequest::new(phone, parse_amount(&amount)?, network);
                let receipt = service.purchase_airtime(ledger.id, request).await?;
                if json {
                    print_json(&receipt)?;
                } else {
                    println!("Airtime purchase successful");
                    println!("  Phone:            {} ({})", receipt.phone_number, receipt.network);
                    println!("  Amount:           {}", format_cents(receipt.amount_cents));
                    println!("  Previous balance: {}", format_cents(receipt.previous_balance));
                    println!("  New balance:      {}", format_cents(receipt.new_balance));
                    println!("  Transaction:      {}", receipt.transaction_id);
                }
            }

            Commands::History {
                owner,
                page,
                limit,
                json,
            } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                let page_size = limit.unwrap_or(service.config().default_page_size);
                let history = service.history(ledger.id, page, page_size).await?;
                if json {
                    print_json(&history)?;
                } else {
                    print_transactions(&history.transactions);
                    let p = &history.pagination;
                    println!();
                    println!(
                        "Page {} of {} ({} transactions)",
                        p.current_page, p.total_pages, p.total_transactions
                    );
                }
            }

            Commands::Summary { owner, json } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                let summary = service.summary(ledger.id).await?;
                if json {
                    print_json(&summary)?;
                } else {
                    println!("Wallet: {}", ledger.owner);
                    println!("  Balance:        {}", format_cents(summary.balance));
                    println!("  Total received: {}", format_cents(summary.total_received));
                    println!("  Total spent:    {}", format_cents(summary.total_spent));
                    println!("  Transactions:   {}", summary.total_transactions);
                    println!();
                    println!("Recent transactions:");
                    print_transactions(&summary.recent_transactions);
                }
            }

            Commands::Check { owner } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                run_check_command(&service, &ledger).await?;
            }

            Commands::Export {
                owner,
                output,
                format,
            } => {
                let service = connect().await?;
                let ledger = service.find_ledger_by_owner(&owner).await?;
                run_export_command(&service, &ledger, output.as_deref(), format).await?;
            }
        }

        Ok(())
    }
}

fn parse_amount(amount: &str) -> Result<i64> {
    parse_cents(amount).context("Invalid amount format. Use '50.00' or '50'")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_applied(tx: &Transaction) {
    println!(
        "Recorded {}: {} (balance {}) ({})",
        tx.kind,
        format_cents(tx.amount_cents),
        format_cents(tx.balance_after),
        tx.id
    );
}

fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:<18} {:<7} {:>12} {:>12} DESCRIPTION",
        "DATE", "KIND", "AMOUNT", "BALANCE"
    );
    println!("{}", "-".repeat(72));
    for tx in transactions {
        println!(
            "{:<18} {:<7} {:>12} {:>12} {}",
            tx.created_at.format("%Y-%m-%d %H:%M"),
            tx.kind.as_str(),
            format_cents(tx.amount_cents),
            format_cents(tx.balance_after),
            truncate(&tx.description, 30)
        );
    }
}

async fn run_check_command(service: &LedgerService, ledger: &Ledger) -> Result<()> {
    println!("Checking ledger for {}...\n", ledger.owner);

    let report = service.check_integrity(ledger.id).await?;

    println!("Transactions:     {}", report.transaction_count);
    println!("Stored balance:   {}", format_cents(report.stored_balance));
    println!("Computed balance: {}", format_cents(report.computed_balance));
    println!();

    if report.is_ok() {
        println!("OK: balance matches history");
        Ok(())
    } else {
        for issue in &report.issues {
            println!("  ! {}", issue);
        }
        anyhow::bail!("ledger has {} integrity issue(s)", report.issues.len())
    }
}

async fn run_export_command(
    service: &LedgerService,
    ledger: &Ledger,
    output: Option<&str>,
    format: ExportFormat,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = match format {
        ExportFormat::Csv => exporter.export_statement_csv(ledger.id, writer).await?,
        ExportFormat::Json => exporter.export_statement_json(ledger.id, writer).await?,
    };

    if output.is_some() {
        eprintln!("Exported {} transactions", count);
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
