pub mod monte_carlo;
pub mod sensitivity;

pub use monte_carlo::{run_monte_carlo, MonteCarloResult};
pub use sensitivity::{run_sensitivity, VariableSensitivity};
