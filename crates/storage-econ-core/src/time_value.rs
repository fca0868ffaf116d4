use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::StorageEconError;
use crate::types::{Money, Rate};
use crate::StorageEconResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const MIN_IRR_RATE: Decimal = dec!(-0.99);
const MAX_IRR_RATE: Decimal = dec!(100.0);
const MAX_BISECTION_ITERATIONS: u32 = 200;
const BISECTION_RATE_TOLERANCE: Decimal = dec!(0.000000001);

/// Candidate rates scanned for an NPV sign change when Newton-Raphson
/// fails. Rates where the series cannot be evaluated are skipped.
const BRACKET_GRID: [Decimal; 13] = [
    dec!(-0.95),
    dec!(-0.75),
    dec!(-0.5),
    dec!(-0.25),
    dec!(-0.1),
    dec!(0),
    dec!(0.1),
    dec!(0.25),
    dec!(0.5),
    dec!(1),
    dec!(2),
    dec!(5),
    dec!(10),
];

/// Net Present Value of a series of cash flows. The first element is
/// the year-0 flow and is not discounted.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> StorageEconResult<Money> {
    if rate <= dec!(-1) {
        return Err(StorageEconError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    npv_at(rate, cash_flows).ok_or_else(|| StorageEconError::NumericalOverflow {
        context: format!("NPV at rate {rate}"),
    })
}

/// Checked NPV evaluation. `None` when a discount factor leaves the
/// representable decimal range.
fn npv_at(rate: Rate, cash_flows: &[Money]) -> Option<Money> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut result = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
            if discount.is_zero() {
                return None;
            }
        }
        result = result.checked_add(cf.checked_div(discount)?)?;
    }

    Some(result)
}

/// NPV and its derivative with respect to the rate, both checked.
fn npv_with_derivative(rate: Rate, cash_flows: &[Money]) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut npv_val = Decimal::ZERO;
    let mut dnpv = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
            if discount.is_zero() {
                return None;
            }
        }
        npv_val = npv_val.checked_add(cf.checked_div(discount)?)?;
        if t > 0 {
            let slope_denominator = discount.checked_mul(one_plus_r)?;
            if slope_denominator.is_zero() {
                return None;
            }
            let term = Decimal::from(t as u64)
                .checked_mul(*cf)?
                .checked_div(slope_denominator)?;
            dnpv = dnpv.checked_sub(term)?;
        }
    }

    Some((npv_val, dnpv))
}

/// Internal Rate of Return: Newton-Raphson with a bracketed bisection
/// fallback. All evaluation is checked, so a diverging iteration ends
/// in `ConvergenceFailure` rather than a decimal overflow panic.
pub fn irr(cash_flows: &[Money], guess: Rate) -> StorageEconResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(StorageEconError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }

    let mut rate = guess;
    let mut last_delta = Decimal::ZERO;

    for _ in 0..MAX_IRR_ITERATIONS {
        // Leaving the evaluable range means Newton has diverged; hand
        // over to the bracketing scan.
        let Some((npv_val, dnpv)) = npv_with_derivative(rate, cash_flows) else {
            break;
        };
        last_delta = npv_val;

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }
        if dnpv.is_zero() {
            break;
        }
        let Some(step) = npv_val.checked_div(dnpv) else {
            break;
        };
        let Some(next) = rate.checked_sub(step) else {
            break;
        };
        rate = next.clamp(MIN_IRR_RATE, MAX_IRR_RATE);
    }

    bisect(cash_flows).ok_or(StorageEconError::ConvergenceFailure {
        function: "IRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta,
    })
}

/// Scan the bracket grid for an NPV sign change and bisect it down to
/// rate tolerance. `None` when no bracket exists (no real root in the
/// scanned range).
fn bisect(cash_flows: &[Money]) -> Option<Rate> {
    let mut previous: Option<(Rate, Decimal)> = None;
    let mut bracket = None;

    for rate in BRACKET_GRID {
        let Some(value) = npv_at(rate, cash_flows) else {
            continue;
        };
        if value.abs() < CONVERGENCE_THRESHOLD {
            return Some(rate);
        }
        if let Some((low, low_value)) = previous {
            if (low_value > Decimal::ZERO) != (value > Decimal::ZERO) {
                bracket = Some((low, low_value, rate));
                break;
            }
        }
        previous = Some((rate, value));
    }

    let (mut low, mut low_value, mut high) = bracket?;
    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = (low + high) / Decimal::TWO;
        let value = npv_at(mid, cash_flows)?;
        if value.abs() < CONVERGENCE_THRESHOLD || high - low < BISECTION_RATE_TOLERANCE {
            return Some(mid);
        }
        if (value > Decimal::ZERO) == (low_value > Decimal::ZERO) {
            low = mid;
            low_value = value;
        } else {
            high = mid;
        }
    }

    Some((low + high) / Decimal::TWO)
}

/// Level annuity payment that amortizes `present_value` over `nper`
/// periods at `rate`.
pub fn annuity_payment(rate: Rate, nper: u32, present_value: Money) -> StorageEconResult<Money> {
    if nper == 0 {
        return Err(StorageEconError::InvalidInput {
            field: "nper".into(),
            reason: "Number of periods must be > 0".into(),
        });
    }

    if rate.is_zero() {
        return Ok(present_value / Decimal::from(nper));
    }

    Ok(present_value * capital_recovery_factor(rate, nper)?)
}

/// Capital recovery factor: annuitizes a present value into equal
/// payments. `r(1+r)^n / ((1+r)^n - 1)` for r > 0, `1/n` for r = 0.
pub fn capital_recovery_factor(rate: Rate, nper: u32) -> StorageEconResult<Rate> {
    if nper == 0 {
        return Err(StorageEconError::InvalidInput {
            field: "nper".into(),
            reason: "Number of periods must be > 0".into(),
        });
    }
    if rate < Decimal::ZERO {
        return Err(StorageEconError::InvalidInput {
            field: "rate".into(),
            reason: "CRF requires a non-negative rate".into(),
        });
    }

    if rate.is_zero() {
        return Ok(Decimal::ONE / Decimal::from(nper));
    }

    let factor = (Decimal::ONE + rate)
        .checked_powi(i64::from(nper))
        .ok_or_else(|| StorageEconError::NumericalOverflow {
            context: format!("CRF compounding factor over {nper} periods"),
        })?;
    let denominator = factor - Decimal::ONE;
    if denominator.is_zero() {
        return Err(StorageEconError::DivisionByZero {
            context: "CRF denominator".into(),
        });
    }

    Ok(rate * factor / denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // NPV at 10%: -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(1.0));
    }

    #[test]
    fn test_npv_zero_rate() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        let result = npv(dec!(0.0), &cfs).unwrap();
        assert_eq!(result, dec!(50));
    }

    #[test]
    fn test_irr_basic() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = irr(&cfs, dec!(0.10)).unwrap();
        // IRR should be ~9.7%
        assert!((result - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_irr_all_negative_fails() {
        let cfs = vec![dec!(-1000), dec!(-50), dec!(-50)];
        assert!(irr(&cfs, dec!(0.10)).is_err());
    }

    #[test]
    fn test_irr_backloaded_series_converges() {
        // Newton overshoots on this shape (negative flows for a decade,
        // recovery only in the tail) and used to leave the representable
        // rate range. The root exists and must be found.
        let mut cfs = vec![dec!(-2650000)];
        cfs.extend(std::iter::repeat(dec!(-100000)).take(10));
        cfs.extend(std::iter::repeat(dec!(550000)).take(5));

        let rate = irr(&cfs, dec!(0.1)).unwrap();
        assert!(rate > dec!(-1) && rate < dec!(0));
        let residual = npv(rate, &cfs).unwrap();
        assert!(residual.abs() < dec!(1), "residual={residual}");
    }

    #[test]
    fn test_irr_divergent_series_errors_instead_of_panicking() {
        // Sign pattern with no real root in range: the result is an
        // explicit convergence failure whatever path Newton takes.
        let mut cfs = vec![dec!(-8000000)];
        cfs.extend(std::iter::repeat(dec!(-600000)).take(14));
        cfs.push(dec!(-500000));

        let result = irr(&cfs, dec!(0.1));
        assert!(matches!(
            result,
            Err(StorageEconError::ConvergenceFailure { .. })
        ));
    }

    #[test]
    fn test_npv_steeply_negative_rate_is_error_not_panic() {
        let mut cfs = vec![dec!(-1000000)];
        cfs.extend(std::iter::repeat(dec!(500000)).take(15));
        assert!(npv(dec!(-0.999999), &cfs).is_err());
    }

    #[test]
    fn test_crf_standard_identity() {
        // CRF(8%, 10 years) ≈ 0.14903
        let crf = capital_recovery_factor(dec!(0.08), 10).unwrap();
        assert!((crf - dec!(0.14903)).abs() < dec!(0.00001), "crf={crf}");
    }

    #[test]
    fn test_crf_zero_rate() {
        let crf = capital_recovery_factor(dec!(0), 5).unwrap();
        assert_eq!(crf, dec!(0.2));
    }

    #[test]
    fn test_annuity_payment_matches_crf() {
        let pmt = annuity_payment(dec!(0.05), 10, dec!(1000)).unwrap();
        let crf = capital_recovery_factor(dec!(0.05), 10).unwrap();
        assert_eq!(pmt, dec!(1000) * crf);
    }
}
