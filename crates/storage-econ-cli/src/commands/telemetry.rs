use clap::Args;
use serde_json::Value;

use storage_econ_core::telemetry::{self, SystemConfig, TelemetryRecord};

/// Arguments for battery telemetry analysis
#[derive(Args)]
pub struct TelemetryArgs {
    /// Path to the telemetry CSV log
    #[arg(long)]
    pub input: String,

    /// System design capacity, kWh
    #[arg(long, default_value_t = 2000.0)]
    pub capacity_kwh: f64,

    /// System power rating, kW
    #[arg(long, default_value_t = 500.0)]
    pub max_power_kw: f64,

    /// Total system mass, kg
    #[arg(long, default_value_t = 10_000.0)]
    pub mass_kg: f64,

    /// Total system volume, m3
    #[arg(long, default_value_t = 20.0)]
    pub volume_m3: f64,
}

pub fn run(args: TelemetryArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(&args.input)
        .map_err(|e| format!("Failed to open '{}': {}", args.input, e))?;

    let mut records: Vec<TelemetryRecord> = Vec::new();
    for row in reader.deserialize() {
        records.push(row.map_err(|e| format!("Failed to parse '{}': {}", args.input, e))?);
    }

    let config = SystemConfig {
        design_capacity_kwh: args.capacity_kwh,
        max_power_kw: args.max_power_kw,
        total_mass_kg: args.mass_kg,
        total_volume_m3: args.volume_m3,
        ..SystemConfig::default()
    };

    let output = telemetry::analyze_performance(&config, &records)?;
    Ok(serde_json::to_value(&output)?)
}
