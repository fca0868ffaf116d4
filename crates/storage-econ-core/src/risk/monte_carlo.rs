use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::cashflow;
use crate::error::StorageEconError;
use crate::metrics;
use crate::params::{MonteCarloConfig, NormalDistribution, ParameterSet};
use crate::StorageEconResult;

const DEBT_RATIO_CAP: f64 = 0.8;

/// Distributional summary of one simulated metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub p5: f64,
    pub p95: f64,
    /// Number of draws in which this metric was defined
    pub samples: u32,
}

/// Threshold-crossing probabilities; `None` when the underlying
/// metric had no defined samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdProbabilities {
    pub project_irr_above_discount_rate: Option<f64>,
    pub equity_irr_above_hurdle: Option<f64>,
    pub min_dscr_below_1_2: Option<f64>,
    pub min_dscr_below_1_0: Option<f64>,
}

/// Aggregated Monte Carlo risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub num_simulations: u32,
    /// Draws that produced a statement and metrics
    pub completed: u32,
    /// Draws excluded for numerical failure (never counted as zero)
    pub failed: u32,
    /// Draws not run because the deadline was hit
    pub skipped: u32,
    pub project_irr: Option<MetricSummary>,
    pub equity_irr: Option<MetricSummary>,
    pub min_dscr: Option<MetricSummary>,
    pub probabilities: ThresholdProbabilities,
}

/// Per-draw metric samples, each independently defined.
struct DrawMetrics {
    project_irr: Option<f64>,
    equity_irr: Option<f64>,
    min_dscr: Option<f64>,
}

enum DrawOutcome {
    Completed(DrawMetrics),
    Failed,
    Skipped,
}

/// Run the Monte Carlo simulation: each draw samples the uncertain
/// inputs, clones the baseline with overrides, and re-runs the full
/// cash-flow + metrics pipeline. Draws are independent and execute in
/// parallel; only the final scalar aggregates are merged.
pub fn run_monte_carlo(
    baseline: &ParameterSet,
    config: &MonteCarloConfig,
) -> StorageEconResult<MonteCarloResult> {
    baseline.validate()?;
    // Any positive draw count is accepted; small samples are flagged
    // as a warning by the report layer, not rejected here.
    if config.num_simulations == 0 {
        return Err(StorageEconError::InvalidInput {
            field: "monte_carlo.num_simulations".into(),
            reason: "Must be at least 1".into(),
        });
    }

    let price_dist = normal("monte_carlo.price_diff", &config.price_diff)?;
    let invest_dist = normal("monte_carlo.total_investment", &config.total_investment)?;
    let debt_dist = match &config.debt_ratio {
        Some(params) => Some(normal("monte_carlo.debt_ratio", params)?),
        None => None,
    };

    let base_seed = config
        .seed
        .unwrap_or_else(|| StdRng::from_entropy().gen());
    let deadline = config
        .max_runtime_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let stop = AtomicBool::new(false);

    let draws: Vec<DrawOutcome> = (0..config.num_simulations)
        .into_par_iter()
        .map(|i| {
            if stop.load(Ordering::Relaxed) {
                return DrawOutcome::Skipped;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    stop.store(true, Ordering::Relaxed);
                    return DrawOutcome::Skipped;
                }
            }

            // Derived per-draw RNG keeps draws independent and the
            // whole run reproducible under a fixed seed.
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(u64::from(i)));
            run_draw(baseline, &mut rng, &price_dist, &invest_dist, debt_dist.as_ref())
        })
        .collect();

    let mut completed = 0u32;
    let mut failed = 0u32;
    let mut skipped = 0u32;
    let mut project_irrs = Vec::new();
    let mut equity_irrs = Vec::new();
    let mut min_dscrs = Vec::new();

    for draw in draws {
        match draw {
            DrawOutcome::Completed(m) => {
                completed += 1;
                if let Some(v) = m.project_irr {
                    project_irrs.push(v);
                }
                if let Some(v) = m.equity_irr {
                    equity_irrs.push(v);
                }
                if let Some(v) = m.min_dscr {
                    min_dscrs.push(v);
                }
            }
            DrawOutcome::Failed => failed += 1,
            DrawOutcome::Skipped => skipped += 1,
        }
    }

    let discount_rate = decimal_to_f64(baseline.financial.discount_rate);
    let hurdle = decimal_to_f64(baseline.financial.equity_hurdle());

    let probabilities = ThresholdProbabilities {
        project_irr_above_discount_rate: probability(&project_irrs, |v| v > discount_rate),
        equity_irr_above_hurdle: probability(&equity_irrs, |v| v > hurdle),
        min_dscr_below_1_2: probability(&min_dscrs, |v| v < 1.2),
        min_dscr_below_1_0: probability(&min_dscrs, |v| v < 1.0),
    };

    Ok(MonteCarloResult {
        num_simulations: config.num_simulations,
        completed,
        failed,
        skipped,
        project_irr: summarize(&mut project_irrs),
        equity_irr: summarize(&mut equity_irrs),
        min_dscr: summarize(&mut min_dscrs),
        probabilities,
    })
}

fn normal(field: &str, params: &NormalDistribution) -> StorageEconResult<Normal> {
    Normal::new(params.mean, params.std_dev).map_err(|e| StorageEconError::InvalidInput {
        field: field.into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })
}

fn run_draw(
    baseline: &ParameterSet,
    rng: &mut StdRng,
    price_dist: &Normal,
    invest_dist: &Normal,
    debt_dist: Option<&Normal>,
) -> DrawOutcome {
    let price = rng.sample(*price_dist);
    let investment = rng.sample(*invest_dist);

    let (Some(price), Some(investment)) = (Decimal::from_f64(price), Decimal::from_f64(investment))
    else {
        return DrawOutcome::Failed;
    };

    let mut scenario = baseline
        .with_price_diff(price)
        .with_total_investment(investment);

    if let Some(dist) = debt_dist {
        let ratio = rng.sample(*dist).clamp(0.0, DEBT_RATIO_CAP);
        match Decimal::from_f64(ratio) {
            Some(ratio) => scenario = scenario.with_debt_ratio(ratio),
            None => return DrawOutcome::Failed,
        }
    }

    let Ok(statement) = cashflow::build_statement(&scenario) else {
        return DrawOutcome::Failed;
    };
    let Ok(metrics) = metrics::calculate_metrics(&scenario, &statement) else {
        return DrawOutcome::Failed;
    };

    DrawOutcome::Completed(DrawMetrics {
        project_irr: metrics.project_irr.map(decimal_to_f64),
        equity_irr: metrics.equity_irr.map(decimal_to_f64),
        min_dscr: metrics.min_dscr.map(decimal_to_f64),
    })
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

fn probability(samples: &[f64], predicate: impl Fn(f64) -> bool) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let count = samples.iter().copied().filter(|&v| predicate(v)).count();
    Some(count as f64 / samples.len() as f64)
}

/// Mean, population std-dev and interpolated 5th/95th percentiles.
/// Sorts the sample buffer in place.
fn summarize(values: &mut Vec<f64>) -> Option<MetricSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some(MetricSummary {
        mean,
        std_dev: variance.sqrt(),
        p5: percentile_sorted(values, 5.0),
        p95: percentile_sorted(values, 95.0),
        samples: values.len() as u32,
    })
}

/// Percentile from a sorted slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_params;

    const SEED: u64 = 42;

    fn config() -> MonteCarloConfig {
        MonteCarloConfig {
            num_simulations: 500,
            seed: Some(SEED),
            max_runtime_ms: None,
            price_diff: NormalDistribution {
                mean: 0.12,
                std_dev: 0.02,
            },
            total_investment: NormalDistribution {
                mean: 10_000_000.0,
                std_dev: 800_000.0,
            },
            debt_ratio: Some(NormalDistribution {
                mean: 0.6,
                std_dev: 0.1,
            }),
        }
    }

    #[test]
    fn test_draw_accounting_adds_up() {
        let result = run_monte_carlo(&test_params(), &config()).unwrap();
        assert_eq!(result.num_simulations, 500);
        assert_eq!(result.completed + result.failed + result.skipped, 500);
        assert!(result.completed > 0);
    }

    #[test]
    fn test_probabilities_lie_in_unit_interval() {
        let result = run_monte_carlo(&test_params(), &config()).unwrap();
        for p in [
            result.probabilities.project_irr_above_discount_rate,
            result.probabilities.equity_irr_above_hurdle,
            result.probabilities.min_dscr_below_1_2,
            result.probabilities.min_dscr_below_1_0,
        ]
        .into_iter()
        .flatten()
        {
            assert!((0.0..=1.0).contains(&p), "p={p}");
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let params = test_params();
        let cfg = config();
        let r1 = run_monte_carlo(&params, &cfg).unwrap();
        let r2 = run_monte_carlo(&params, &cfg).unwrap();
        assert_eq!(r1.completed, r2.completed);
        assert_eq!(
            r1.project_irr.as_ref().map(|s| s.mean),
            r2.project_irr.as_ref().map(|s| s.mean)
        );
        assert_eq!(
            r1.min_dscr.as_ref().map(|s| s.p95),
            r2.min_dscr.as_ref().map(|s| s.p95)
        );
    }

    #[test]
    fn test_percentiles_ordered() {
        let result = run_monte_carlo(&test_params(), &config()).unwrap();
        if let Some(summary) = &result.project_irr {
            assert!(summary.p5 <= summary.p95);
            assert!(summary.std_dev >= 0.0);
        }
    }

    #[test]
    fn test_baseline_untouched_by_simulation() {
        let params = test_params();
        let investment_before = params.cost.total_investment;
        let _ = run_monte_carlo(&params, &config()).unwrap();
        assert_eq!(params.cost.total_investment, investment_before);
    }

    #[test]
    fn test_zero_simulations_rejected() {
        let mut cfg = config();
        cfg.num_simulations = 0;
        assert!(run_monte_carlo(&test_params(), &cfg).is_err());
    }

    #[test]
    fn test_small_run_is_accepted() {
        let mut cfg = config();
        cfg.num_simulations = 10;
        let result = run_monte_carlo(&test_params(), &cfg).unwrap();
        assert_eq!(result.num_simulations, 10);
        assert_eq!(result.completed + result.failed + result.skipped, 10);
    }

    #[test]
    fn test_invalid_distribution_rejected() {
        let mut cfg = config();
        cfg.price_diff.std_dev = -1.0;
        assert!(run_monte_carlo(&test_params(), &cfg).is_err());
    }

    #[test]
    fn test_degenerate_investment_draws_fail_in_isolation() {
        // A wide investment distribution produces some negative draws;
        // those must be excluded, not zeroed, and the rest proceed.
        let mut cfg = config();
        cfg.total_investment = NormalDistribution {
            mean: 1_000_000.0,
            std_dev: 2_000_000.0,
        };
        let result = run_monte_carlo(&test_params(), &cfg).unwrap();
        assert!(result.failed > 0);
        assert!(result.completed > 0);
        assert_eq!(result.completed + result.failed + result.skipped, 500);
    }

    #[test]
    fn test_sample_counts_never_exceed_completed() {
        let result = run_monte_carlo(&test_params(), &config()).unwrap();
        for summary in [&result.project_irr, &result.equity_irr, &result.min_dscr]
            .into_iter()
            .flatten()
        {
            assert!(summary.samples <= result.completed);
        }
    }
}
