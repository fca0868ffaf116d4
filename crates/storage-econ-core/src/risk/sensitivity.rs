use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::cashflow;
use crate::metrics;
use crate::params::ParameterSet;
use crate::types::Rate;
use crate::StorageEconResult;

/// Relative perturbations applied to each tested variable.
pub const PERTURBATIONS: [Decimal; 4] = [dec!(-0.2), dec!(-0.1), dec!(0.1), dec!(0.2)];

/// The fixed set of inputs swept one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitivityVariable {
    PriceDiff,
    TotalInvestment,
    DebtRatio,
    LoanRate,
    AncillaryPrice,
    OpexRate,
}

impl SensitivityVariable {
    pub fn all() -> [SensitivityVariable; 6] {
        [
            SensitivityVariable::PriceDiff,
            SensitivityVariable::TotalInvestment,
            SensitivityVariable::DebtRatio,
            SensitivityVariable::LoanRate,
            SensitivityVariable::AncillaryPrice,
            SensitivityVariable::OpexRate,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            SensitivityVariable::PriceDiff => "price_diff",
            SensitivityVariable::TotalInvestment => "total_investment",
            SensitivityVariable::DebtRatio => "debt_ratio",
            SensitivityVariable::LoanRate => "loan_rate",
            SensitivityVariable::AncillaryPrice => "ancillary_price",
            SensitivityVariable::OpexRate => "opex_rate",
        }
    }

    /// Clone the baseline with this variable scaled by `1 + change`.
    pub fn apply(&self, baseline: &ParameterSet, change: Rate) -> ParameterSet {
        let factor = Decimal::ONE + change;
        match self {
            SensitivityVariable::PriceDiff => {
                baseline.with_price_diff(baseline.market.price_diff * factor)
            }
            SensitivityVariable::TotalInvestment => {
                baseline.with_total_investment(baseline.cost.total_investment * factor)
            }
            SensitivityVariable::DebtRatio => {
                baseline.with_debt_ratio(baseline.financial.financing.debt_ratio * factor)
            }
            SensitivityVariable::LoanRate => {
                baseline.with_loan_rate(baseline.financial.financing.loan_rate * factor)
            }
            SensitivityVariable::AncillaryPrice => {
                baseline.with_ancillary_price(baseline.market.ancillary_price * factor)
            }
            SensitivityVariable::OpexRate => {
                baseline.with_opex_rate(baseline.cost.opex_rate * factor)
            }
        }
    }
}

/// Outcome of a single perturbation cell. A numerical failure is an
/// explicit marker, not a silent skip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellOutcome {
    Ok {
        project_irr: Option<Rate>,
        equity_irr: Option<Rate>,
        min_dscr: Option<Decimal>,
    },
    Failed {
        reason: String,
    },
}

/// One perturbation of one variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityCell {
    /// Relative change applied (e.g. -0.2 for -20%)
    pub change: Rate,
    #[serde(flatten)]
    pub outcome: CellOutcome,
}

/// All perturbations of one variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSensitivity {
    pub variable: String,
    pub cells: Vec<SensitivityCell>,
}

/// One-at-a-time sensitivity sweep over the fixed variable set.
/// Failed cells are recorded and do not abort the rest of the sweep.
pub fn run_sensitivity(baseline: &ParameterSet) -> StorageEconResult<Vec<VariableSensitivity>> {
    baseline.validate()?;

    let mut results = Vec::with_capacity(SensitivityVariable::all().len());
    for variable in SensitivityVariable::all() {
        let mut cells = Vec::with_capacity(PERTURBATIONS.len());
        for change in PERTURBATIONS {
            let scenario = variable.apply(baseline, change);
            let outcome = match evaluate(&scenario) {
                Ok(cell) => cell,
                Err(e) => CellOutcome::Failed {
                    reason: e.to_string(),
                },
            };
            cells.push(SensitivityCell { change, outcome });
        }
        results.push(VariableSensitivity {
            variable: variable.label().to_string(),
            cells,
        });
    }

    Ok(results)
}

fn evaluate(scenario: &ParameterSet) -> StorageEconResult<CellOutcome> {
    let statement = cashflow::build_statement(scenario)?;
    let metrics = metrics::calculate_metrics(scenario, &statement)?;
    Ok(CellOutcome::Ok {
        project_irr: metrics.project_irr,
        equity_irr: metrics.equity_irr,
        min_dscr: metrics.min_dscr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_params;

    fn cell_project_irr(results: &[VariableSensitivity], variable: &str, change: Decimal) -> Option<Rate> {
        let var = results.iter().find(|v| v.variable == variable).unwrap();
        let cell = var.cells.iter().find(|c| c.change == change).unwrap();
        match &cell.outcome {
            CellOutcome::Ok { project_irr, .. } => *project_irr,
            CellOutcome::Failed { reason } => panic!("cell failed: {reason}"),
        }
    }

    #[test]
    fn test_sweep_covers_all_variables_and_changes() {
        let results = run_sensitivity(&test_params()).unwrap();
        assert_eq!(results.len(), 6);
        for var in &results {
            assert_eq!(var.cells.len(), 4);
        }
    }

    #[test]
    fn test_price_diff_up_raises_project_irr() {
        let baseline = test_params();
        let statement = crate::cashflow::build_statement(&baseline).unwrap();
        let base_metrics = crate::metrics::calculate_metrics(&baseline, &statement).unwrap();
        let base_irr = base_metrics.project_irr.unwrap();

        let results = run_sensitivity(&baseline).unwrap();
        let up20 = cell_project_irr(&results, "price_diff", dec!(0.2)).unwrap();
        let down20 = cell_project_irr(&results, "price_diff", dec!(-0.2)).unwrap();
        assert!(up20 > base_irr);
        assert!(down20 < base_irr);
    }

    #[test]
    fn test_baseline_not_mutated_by_sweep() {
        let baseline = test_params();
        let price_before = baseline.market.price_diff;
        let _ = run_sensitivity(&baseline).unwrap();
        assert_eq!(baseline.market.price_diff, price_before);
    }

    #[test]
    fn test_invalid_perturbation_is_marked_failed() {
        // debt_ratio 0.9 * 1.2 > 1, so the +20% cell must fail without
        // aborting the sweep
        let baseline = test_params().with_debt_ratio(dec!(0.9));
        let results = run_sensitivity(&baseline).unwrap();
        let debt = results.iter().find(|v| v.variable == "debt_ratio").unwrap();
        let up20 = debt.cells.iter().find(|c| c.change == dec!(0.2)).unwrap();
        assert!(matches!(up20.outcome, CellOutcome::Failed { .. }));
        let down20 = debt.cells.iter().find(|c| c.change == dec!(-0.2)).unwrap();
        assert!(matches!(down20.outcome, CellOutcome::Ok { .. }));
        // Other variables unaffected
        assert_eq!(results.len(), 6);
    }
}
