pub mod analyze;
pub mod cashflow;
pub mod telemetry;
