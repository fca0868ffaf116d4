mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analyze::AnalyzeArgs;
use commands::cashflow::CashflowArgs;
use commands::telemetry::TelemetryArgs;

/// Energy-storage project economics from the command line
#[derive(Parser)]
#[command(
    name = "sea",
    version,
    about = "Storage economics analyzer",
    long_about = "Evaluates the economic viability of energy-storage projects with \
                  decimal precision: yearly cash-flow statements, NPV/IRR/DSCR/LCOS \
                  metrics, sensitivity sweeps, Monte Carlo risk simulation, and \
                  battery telemetry analytics."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full viability analysis (metrics, sensitivity, risk)
    Analyze(AnalyzeArgs),
    /// Print the yearly cash-flow statement
    Cashflow(CashflowArgs),
    /// Analyze a battery telemetry log
    Telemetry(TelemetryArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
}

fn main() {
    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Cashflow(args) => commands::cashflow::run(args),
        Commands::Telemetry(args) => commands::telemetry::run(args),
        Commands::Version => {
            println!("sea {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
