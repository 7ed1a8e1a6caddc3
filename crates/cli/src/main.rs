// ledgermatch CLI - ledger vs. observed-chain transaction reconciliation

mod exit_codes;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "ledgermatch")]
#[command(about = "Reconcile an exchange ledger against observed on-chain activity")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match, classify and scan both sources named in a TOML config
    #[command(after_help = "\
Examples:
  ledgermatch run wallet.recon.toml
  ledgermatch run wallet.recon.toml --json
  ledgermatch run wallet.recon.toml --output report.json
  ledgermatch run wallet.recon.toml --year 2024")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Output JSON to stdout instead of only the human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Override the config's reporting_year
        #[arg(long, env = "LEDGERMATCH_YEAR")]
        year: Option<i32>,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  ledgermatch validate wallet.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },

    /// Pair two record files with default matching thresholds
    #[command(after_help = "\
Examples:
  ledgermatch match --ledger ledger.csv --observed chain.json
  ledgermatch match --ledger ledger.csv --observed chain.csv --json")]
    Match {
        /// Ledger export (.csv or .json)
        #[arg(long)]
        ledger: PathBuf,

        /// Observed chain records (.csv or .json)
        #[arg(long)]
        observed: PathBuf,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Scan record files for fee, duplicate and out-of-year anomalies
    #[command(after_help = "\
Examples:
  ledgermatch anomalies --year 2025 ledger.csv --observed chain.json
  ledgermatch anomalies --year 2025 ledger.csv --json")]
    Anomalies {
        /// Reporting year; records dated in any other year are flagged
        #[arg(long, env = "LEDGERMATCH_YEAR")]
        year: i32,

        /// Ledger export files (.csv or .json)
        #[arg(required_unless_present = "observed")]
        files: Vec<PathBuf>,

        /// Observed chain record file; repeat for several
        #[arg(long)]
        observed: Vec<PathBuf>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  ledgermatch-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, json, output, year } => recon::cmd_run(config, json, output, year),
        Commands::Validate { config } => recon::cmd_validate(config),
        Commands::Match { ledger, observed, json } => recon::cmd_match(ledger, observed, json),
        Commands::Anomalies { year, files, observed, json } => {
            recon::cmd_anomalies(year, files, observed, json)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
