use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;

mod check;
mod rates;

use check::run_checks;
use rates::{get_rate, set_rate};

#[derive(Parser, Debug)]
#[command(version, about = "Operator tools for the fiscus ledger")]
pub struct Arguments {
    /// Database URL. Falls back to FISCUS_DATABASE_URL, then the default store path.
    #[arg(short = 'd', long = "database-url", global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ledger consistency checks. Exits non-zero if any violation remains.
    #[clap(name = "check")]
    Check {
        /// Apply the safe auto-fixes where a check has one
        #[arg(short = 'f', long = "fix")]
        fix: bool,
    },
    /// Inspect or store exchange rates
    #[command(subcommand)]
    Rate(RateCommand),
}

#[derive(Debug, Subcommand)]
pub enum RateCommand {
    /// Show the rate for a currency pair
    Get(RateGetParams),
    /// Record a new rate observation for a currency pair
    Set(RateSetParams),
}

#[derive(Debug, Args)]
pub struct RateGetParams {
    /// The base currency, e.g. USD
    #[arg(required = true, index = 1)]
    base: String,
    /// The quote currency, e.g. EUR
    #[arg(required = true, index = 2)]
    quote: String,
    /// Look the rate up as of this moment (RFC 3339) instead of the latest observation
    #[arg(short = 'a', long = "as-of")]
    as_of: Option<String>,
}

#[derive(Debug, Args)]
pub struct RateSetParams {
    /// The base currency, e.g. USD
    #[arg(required = true, index = 1)]
    base: String,
    /// The quote currency, e.g. EUR
    #[arg(required = true, index = 2)]
    quote: String,
    /// Units of quote currency per unit of base currency
    #[arg(required = true, index = 3)]
    rate: f64,
    /// The observation's validity date (RFC 3339). Defaults to now.
    #[arg(short = 'a', long = "as-of")]
    as_of: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();
    let cli = Arguments::parse();
    match cli.command {
        Command::Check { fix } => run_checks(cli.database_url.as_deref(), fix).await,
        Command::Rate(RateCommand::Get(params)) => get_rate(cli.database_url.as_deref(), params).await,
        Command::Rate(RateCommand::Set(params)) => set_rate(cli.database_url.as_deref(), params).await,
    }
}
