use clap::Args;
use serde_json::{json, Value};

use storage_econ_core::cashflow;

use crate::commands::analyze::load_params;

/// Arguments for the cash-flow statement
#[derive(Args)]
pub struct CashflowArgs {
    /// Path to a JSON or YAML parameter file (JSON on stdin if omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Decimal places for monetary figures
    #[arg(long, default_value = "2")]
    pub precision: u32,
}

pub fn run(args: CashflowArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let params = load_params(args.input.as_deref())?;
    let statement = cashflow::build_statement(&params)?;

    let years: Vec<_> = statement
        .years
        .iter()
        .map(|record| record.rounded(args.precision))
        .collect();

    Ok(json!({
        "financing": statement.financing,
        "results": years,
    }))
}
