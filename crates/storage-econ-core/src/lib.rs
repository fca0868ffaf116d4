pub mod cashflow;
pub mod error;
pub mod metrics;
pub mod params;
pub mod report;
pub mod risk;
pub mod time_value;
pub mod types;

#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use error::StorageEconError;
pub use types::*;

/// Standard result type for all storage-econ operations
pub type StorageEconResult<T> = Result<T, StorageEconError>;
