pub mod costs;
pub mod engine;
pub mod financing;
pub mod revenue;
pub mod tax;

pub use engine::{build_statement, CashFlowStatement, YearlyRecord};
pub use financing::{DebtScheduleRow, FinancingSplit};
