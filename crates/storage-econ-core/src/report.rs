use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::cashflow::{self, FinancingSplit, YearlyRecord};
use crate::metrics::{self, FinancialMetrics};
use crate::params::ParameterSet;
use crate::risk::monte_carlo::{self, MonteCarloResult};
use crate::risk::sensitivity::{self, VariableSensitivity};
use crate::types::{with_metadata, ComputationOutput};
use crate::StorageEconResult;

const DSCR_COMFORT_THRESHOLD: Decimal = dec!(1.2);
const REPORT_PRECISION_DP: u32 = 2;
const SMALL_SAMPLE_THRESHOLD: u32 = 100;

/// Overall investment verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Returns clear the hurdle and debt coverage is comfortable
    Investable,
    /// Viable on one dimension but weak on another
    Cautious,
    NotInvestable,
}

/// Headline numbers and the verdict they support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub verdict: Verdict,
    pub metrics: FinancialMetrics,
    pub financing: FinancingSplit,
}

/// Monte Carlo section of the report. Absent configuration is an
/// explicit state, not an empty result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum MonteCarloAssessment {
    Completed(MonteCarloResult),
    NotConfigured,
}

/// The complete analysis report for one parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub assessment_summary: AssessmentSummary,
    pub risk_assessment_monte_carlo: MonteCarloAssessment,
    pub sensitivity_analysis: Vec<VariableSensitivity>,
    /// Yearly statement rounded for presentation
    pub detailed_financials_statement: Vec<YearlyRecord>,
}

/// Run the full viability analysis: cash-flow statement, investment
/// metrics, sensitivity sweep, and (when configured) the Monte Carlo
/// risk simulation.
pub fn analyze(params: &ParameterSet) -> StorageEconResult<ComputationOutput<AnalysisReport>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let statement = cashflow::build_statement(params)?;
    let financial_metrics = metrics::calculate_metrics(params, &statement)?;
    let sensitivity_analysis = sensitivity::run_sensitivity(params)?;

    let risk_assessment_monte_carlo = match &params.financial.monte_carlo {
        Some(config) => {
            let result = monte_carlo::run_monte_carlo(params, config)?;
            if result.num_simulations < SMALL_SAMPLE_THRESHOLD {
                warnings.push(format!(
                    "Monte Carlo sample of {} draws is small; aggregate estimates may be noisy",
                    result.num_simulations
                ));
            }
            if result.failed > 0 {
                warnings.push(format!(
                    "{} of {} Monte Carlo draws failed numerically and were excluded",
                    result.failed, result.num_simulations
                ));
            }
            if result.skipped > 0 {
                warnings.push(format!(
                    "{} Monte Carlo draws skipped after the runtime deadline",
                    result.skipped
                ));
            }
            MonteCarloAssessment::Completed(result)
        }
        None => MonteCarloAssessment::NotConfigured,
    };

    collect_warnings(params, &financial_metrics, &mut warnings);
    let verdict = assess(params, &financial_metrics);

    let detailed_financials_statement = statement
        .years
        .iter()
        .map(|record| record.rounded(REPORT_PRECISION_DP))
        .collect();

    let report = AnalysisReport {
        assessment_summary: AssessmentSummary {
            verdict,
            metrics: financial_metrics,
            financing: statement.financing,
        },
        risk_assessment_monte_carlo,
        sensitivity_analysis,
        detailed_financials_statement,
    };

    let elapsed_us = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Discounted cash flow with Newton-Raphson IRR; one-at-a-time sensitivity sweep; Monte Carlo risk simulation over sampled inputs",
        params,
        warnings,
        elapsed_us,
        report,
    ))
}

/// Verdict rules, applied to the deterministic baseline metrics.
///
/// An all-equity project has no DSCR; undefined coverage does not
/// block an investable verdict.
fn assess(params: &ParameterSet, metrics: &FinancialMetrics) -> Verdict {
    let hurdle_cleared = metrics
        .project_irr
        .map_or(false, |irr| irr > params.financial.discount_rate);
    let coverage_comfortable = metrics
        .min_dscr
        .map_or(true, |dscr| dscr > DSCR_COMFORT_THRESHOLD);

    if hurdle_cleared && coverage_comfortable {
        return Verdict::Investable;
    }
    if hurdle_cleared {
        return Verdict::Cautious;
    }

    let equity_clears_hurdle = metrics
        .equity_irr
        .map_or(false, |irr| irr > params.financial.equity_hurdle());
    if metrics.project_npv >= Decimal::ZERO || equity_clears_hurdle {
        return Verdict::Cautious;
    }

    Verdict::NotInvestable
}

fn collect_warnings(
    params: &ParameterSet,
    metrics: &FinancialMetrics,
    warnings: &mut Vec<String>,
) {
    if let Some(year) = params.cost.battery_replacement_year {
        if year > params.technical.lifespan_years {
            warnings.push(format!(
                "Battery replacement scheduled in year {year}, after the {}-year lifespan; no replacement outlay is incurred",
                params.technical.lifespan_years
            ));
        }
    }
    if metrics.project_irr.is_none() {
        warnings.push(
            "Project IRR did not converge to a real root; judge viability by NPV".to_string(),
        );
    }
    if metrics.equity_irr.is_none() {
        warnings.push(
            "Equity IRR did not converge to a real root; judge viability by equity NPV"
                .to_string(),
        );
    }
    if let Some(dscr) = metrics.min_dscr {
        if dscr < Decimal::ONE {
            warnings.push(format!(
                "Minimum DSCR {} is below 1.0; operating cash flow does not cover debt service in at least one year",
                dscr.round_dp(4)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{test_params, MonteCarloConfig, NormalDistribution};

    fn investable_params() -> ParameterSet {
        let mut params = test_params()
            .with_price_diff(dec!(0.3))
            .with_debt_ratio(Decimal::ZERO);
        params.cost.battery_replacement_cost = Decimal::ZERO;
        params.cost.battery_replacement_year = None;
        params.financial.discount_rate = dec!(0.06);
        params
    }

    #[test]
    fn test_baseline_verdict_not_investable() {
        // Thin arbitrage spread with heavy debt: returns below the
        // discount rate and coverage below 1.0
        let output = analyze(&test_params()).unwrap();
        let summary = &output.result.assessment_summary;
        assert_eq!(summary.verdict, Verdict::NotInvestable);
        assert!(output
            .warnings
            .iter()
            .any(|w| w.contains("below 1.0")));
    }

    #[test]
    fn test_strong_project_is_investable() {
        let output = analyze(&investable_params()).unwrap();
        let summary = &output.result.assessment_summary;
        assert_eq!(summary.verdict, Verdict::Investable);
        assert!(summary.metrics.project_npv > Decimal::ZERO);
        // All-equity: undefined DSCR must not block the verdict
        assert!(summary.metrics.min_dscr.is_none());
    }

    #[test]
    fn test_thin_coverage_downgrades_to_cautious() {
        // Same strong returns, but leveraged hard enough that the
        // worst coverage year dips below 1.2
        let params = investable_params().with_debt_ratio(dec!(0.7));
        let params = {
            let mut p = params;
            p.financial.financing.loan_rate = dec!(0.08);
            p
        };
        let output = analyze(&params).unwrap();
        let summary = &output.result.assessment_summary;
        let min_dscr = summary.metrics.min_dscr.unwrap();
        assert!(min_dscr < dec!(1.2), "min_dscr = {min_dscr}");
        assert_eq!(summary.verdict, Verdict::Cautious);
    }

    #[test]
    fn test_report_sections_populated() {
        let output = analyze(&test_params()).unwrap();
        let report = &output.result;
        assert_eq!(report.detailed_financials_statement.len(), 15);
        assert_eq!(report.sensitivity_analysis.len(), 6);
        assert!(matches!(
            report.risk_assessment_monte_carlo,
            MonteCarloAssessment::NotConfigured
        ));
        assert!(output.metadata.computation_time_us > 0);
    }

    #[test]
    fn test_monte_carlo_section_when_configured() {
        let mut params = test_params();
        params.financial.monte_carlo = Some(MonteCarloConfig {
            num_simulations: 200,
            seed: Some(7),
            max_runtime_ms: None,
            price_diff: NormalDistribution {
                mean: 0.12,
                std_dev: 0.02,
            },
            total_investment: NormalDistribution {
                mean: 10_000_000.0,
                std_dev: 500_000.0,
            },
            debt_ratio: None,
        });
        let output = analyze(&params).unwrap();
        match &output.result.risk_assessment_monte_carlo {
            MonteCarloAssessment::Completed(result) => {
                assert_eq!(result.num_simulations, 200);
                assert!(result.completed > 0);
            }
            MonteCarloAssessment::NotConfigured => panic!("expected completed simulation"),
        }
    }

    #[test]
    fn test_small_monte_carlo_sample_runs_with_warning() {
        let mut params = test_params();
        params.financial.monte_carlo = Some(MonteCarloConfig {
            num_simulations: 50,
            seed: Some(11),
            max_runtime_ms: None,
            price_diff: NormalDistribution {
                mean: 0.12,
                std_dev: 0.02,
            },
            total_investment: NormalDistribution {
                mean: 10_000_000.0,
                std_dev: 500_000.0,
            },
            debt_ratio: None,
        });
        let output = analyze(&params).unwrap();
        assert!(matches!(
            output.result.risk_assessment_monte_carlo,
            MonteCarloAssessment::Completed(_)
        ));
        assert!(output.warnings.iter().any(|w| w.contains("is small")));
    }

    #[test]
    fn test_late_replacement_warned_and_ignored() {
        let mut params = test_params();
        params.cost.battery_replacement_year = Some(20);
        let output = analyze(&params).unwrap();
        assert!(output.warnings.iter().any(|w| w.contains("year 20")));
        for record in &output.result.detailed_financials_statement {
            assert_eq!(record.battery_replacement_capex, Decimal::ZERO);
        }
    }

    #[test]
    fn test_statement_rounded_for_presentation() {
        let output = analyze(&test_params()).unwrap();
        for record in &output.result.detailed_financials_statement {
            assert_eq!(record.ebit, record.ebit.round_dp(2));
            assert_eq!(record.total_revenue, record.total_revenue.round_dp(2));
        }
    }

    #[test]
    fn test_report_serializes_to_json() {
        let output = analyze(&test_params()).unwrap();
        let json = serde_json::to_value(&output).unwrap();
        assert!(json["result"]["assessment_summary"]["verdict"].is_string());
        assert_eq!(
            json["result"]["risk_assessment_monte_carlo"]["status"],
            "not_configured"
        );
    }
}
