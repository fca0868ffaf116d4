use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use storage_econ_core::params::ParameterSet;
use storage_econ_core::report;

use crate::input;

/// Arguments for the full viability analysis
#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to a JSON or YAML parameter file (JSON on stdin if omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Override the peak-valley price differential, $/kWh
    #[arg(long)]
    pub price_diff: Option<Decimal>,

    /// Override the project discount rate (e.g. 0.08 for 8%)
    #[arg(long)]
    pub discount_rate: Option<Decimal>,

    /// Override the debt share of net investment
    #[arg(long)]
    pub debt_ratio: Option<Decimal>,
}

pub fn run(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut params = load_params(args.input.as_deref())?;

    if let Some(price_diff) = args.price_diff {
        params = params.with_price_diff(price_diff);
    }
    if let Some(rate) = args.discount_rate {
        params.financial.discount_rate = rate;
    }
    if let Some(ratio) = args.debt_ratio {
        params = params.with_debt_ratio(ratio);
    }

    let output = report::analyze(&params)?;
    Ok(serde_json::to_value(&output)?)
}

/// Load parameters from a file or piped stdin.
pub fn load_params(path: Option<&str>) -> Result<ParameterSet, Box<dyn std::error::Error>> {
    let value = match path {
        Some(path) => input::file::read_params_value(path)?,
        None => input::stdin::read_stdin()?
            .ok_or("--input is required (or pipe JSON parameters on stdin)")?,
    };
    Ok(ParameterSet::from_json(value)?)
}
