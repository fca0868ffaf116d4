use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::params::{ParameterSet, RepaymentType};
use crate::time_value;
use crate::types::{Money, Rate};
use crate::StorageEconResult;

/// Split of the net-of-VAT investment into debt and equity, plus the
/// one-time investment tax credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingSplit {
    pub net_investment: Money,
    pub loan_amount: Money,
    pub equity_amount: Money,
    pub debt_ratio: Rate,
    pub itc_credit: Money,
}

/// One year of the debt-service schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleRow {
    pub year: u32,
    pub beginning_balance: Money,
    pub principal_payment: Money,
    pub interest_payment: Money,
    pub total_payment: Money,
    pub ending_balance: Money,
}

/// Investment net of the VAT input credit.
pub fn net_investment(params: &ParameterSet) -> Money {
    params.cost.total_investment / (Decimal::ONE + params.financial.vat_rate)
}

/// Debt/equity split and ITC on the net investment.
pub fn financing_split(params: &ParameterSet) -> FinancingSplit {
    let net = net_investment(params);
    let debt_ratio = params.financial.financing.debt_ratio;
    let loan_amount = net * debt_ratio;

    FinancingSplit {
        net_investment: net,
        loan_amount,
        equity_amount: net - loan_amount,
        debt_ratio,
        itc_credit: net * params.cost.itc_rate,
    }
}

/// Year-by-year debt-service schedule. Empty when there is no debt.
pub fn debt_service_schedule(
    params: &ParameterSet,
    loan_amount: Money,
) -> StorageEconResult<Vec<DebtScheduleRow>> {
    if loan_amount <= Decimal::ZERO {
        return Ok(Vec::new());
    }

    let financing = &params.financial.financing;
    let term = financing.loan_term_years;
    let rate = financing.loan_rate;

    let mut schedule = Vec::with_capacity(term as usize);
    let mut balance = loan_amount;

    match financing.repayment_type {
        RepaymentType::EqualInstallment => {
            let installment = time_value::annuity_payment(rate, term, loan_amount)?;
            for year in 1..=term {
                let beginning = balance;
                let interest = balance * rate;
                let principal = installment - interest;
                balance -= principal;
                schedule.push(DebtScheduleRow {
                    year,
                    beginning_balance: beginning,
                    principal_payment: principal,
                    interest_payment: interest,
                    total_payment: installment,
                    ending_balance: balance,
                });
            }
        }
        RepaymentType::EqualPrincipal => {
            let principal = loan_amount / Decimal::from(term);
            for year in 1..=term {
                let beginning = balance;
                let interest = balance * rate;
                balance -= principal;
                schedule.push(DebtScheduleRow {
                    year,
                    beginning_balance: beginning,
                    principal_payment: principal,
                    interest_payment: interest,
                    total_payment: principal + interest,
                    ending_balance: balance,
                });
            }
        }
    }

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_params;
    use rust_decimal_macros::dec;

    const TOLERANCE: Decimal = dec!(0.0001);

    #[test]
    fn test_net_investment_vat_credit() {
        let params = test_params();
        // 10,000,000 / 1.13
        let net = net_investment(&params);
        assert!((net - dec!(8849557.52)).abs() < dec!(0.01), "net={net}");
    }

    #[test]
    fn test_split_sums_to_net_investment() {
        let params = test_params();
        let split = financing_split(&params);
        assert_eq!(
            split.loan_amount + split.equity_amount,
            split.net_investment
        );
        assert_eq!(split.loan_amount, split.net_investment * dec!(0.6));
        assert_eq!(split.itc_credit, split.net_investment * dec!(0.1));
    }

    #[test]
    fn test_no_debt_empty_schedule() {
        let params = test_params().with_debt_ratio(Decimal::ZERO);
        let split = financing_split(&params);
        assert_eq!(split.loan_amount, Decimal::ZERO);
        assert_eq!(split.equity_amount, split.net_investment);
        let schedule = debt_service_schedule(&params, split.loan_amount).unwrap();
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_equal_installment_level_payment() {
        let params = test_params();
        let schedule = debt_service_schedule(&params, dec!(1000000)).unwrap();
        assert_eq!(schedule.len(), 10);

        let first_payment = schedule[0].total_payment;
        for row in &schedule {
            assert!(
                (row.total_payment - first_payment).abs() < TOLERANCE,
                "payment drifted in year {}",
                row.year
            );
        }

        let last = schedule.last().unwrap();
        assert!(last.ending_balance.abs() < TOLERANCE);

        let principal_sum: Decimal = schedule.iter().map(|r| r.principal_payment).sum();
        assert!((principal_sum - dec!(1000000)).abs() < TOLERANCE);
    }

    #[test]
    fn test_equal_installment_interest_declines() {
        let params = test_params();
        let schedule = debt_service_schedule(&params, dec!(1000000)).unwrap();
        for pair in schedule.windows(2) {
            assert!(pair[1].interest_payment < pair[0].interest_payment);
            assert!(pair[1].principal_payment > pair[0].principal_payment);
        }
    }

    #[test]
    fn test_equal_principal_schedule() {
        let mut params = test_params();
        params.financial.financing.repayment_type = RepaymentType::EqualPrincipal;
        let schedule = debt_service_schedule(&params, dec!(1000000)).unwrap();
        assert_eq!(schedule.len(), 10);

        // Constant principal, declining total payment
        for row in &schedule {
            assert!((row.principal_payment - dec!(100000)).abs() < TOLERANCE);
        }
        for pair in schedule.windows(2) {
            assert!(pair[1].total_payment < pair[0].total_payment);
        }

        let last = schedule.last().unwrap();
        assert!(last.ending_balance.abs() < TOLERANCE);

        let principal_sum: Decimal = schedule.iter().map(|r| r.principal_payment).sum();
        assert!((principal_sum - dec!(1000000)).abs() < TOLERANCE);
    }

    #[test]
    fn test_year_one_interest_on_full_balance() {
        let params = test_params();
        let schedule = debt_service_schedule(&params, dec!(1000000)).unwrap();
        assert_eq!(schedule[0].interest_payment, dec!(50000));
        assert_eq!(schedule[0].beginning_balance, dec!(1000000));
    }
}
