use anyhow::Result;
use clap::Parser;
use purse::cli::Cli;
use purse::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    init_logging(level, cli.log_format);
    cli.run().await
}
