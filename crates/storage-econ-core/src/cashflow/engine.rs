use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cashflow::costs;
use crate::cashflow::financing::{self, DebtScheduleRow, FinancingSplit};
use crate::cashflow::revenue;
use crate::cashflow::tax::{self, LossCarryforward};
use crate::params::ParameterSet;
use crate::types::Money;
use crate::StorageEconResult;

/// One line of the yearly cash-flow statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearlyRecord {
    pub year: u32,
    pub arbitrage_revenue: Money,
    pub capacity_revenue: Money,
    pub ancillary_revenue: Money,
    pub demand_response_revenue: Money,
    pub grid_deferral_value: Money,
    pub subsidy_revenue: Money,
    pub total_revenue: Money,
    pub fixed_opex: Money,
    pub degradation_cost: Money,
    pub total_opex: Money,
    pub depreciation: Money,
    pub ebit: Money,
    pub accumulated_loss: Money,
    pub taxable_income: Money,
    pub income_tax: Money,
    pub net_profit: Money,
    pub battery_replacement_capex: Money,
    pub project_cash_flow: Money,
    pub principal_payment: Money,
    pub interest_payment: Money,
    pub equity_cash_flow: Money,
}

impl YearlyRecord {
    /// Copy with every monetary field rounded to the given precision.
    pub fn rounded(&self, dp: u32) -> YearlyRecord {
        YearlyRecord {
            year: self.year,
            arbitrage_revenue: self.arbitrage_revenue.round_dp(dp),
            capacity_revenue: self.capacity_revenue.round_dp(dp),
            ancillary_revenue: self.ancillary_revenue.round_dp(dp),
            demand_response_revenue: self.demand_response_revenue.round_dp(dp),
            grid_deferral_value: self.grid_deferral_value.round_dp(dp),
            subsidy_revenue: self.subsidy_revenue.round_dp(dp),
            total_revenue: self.total_revenue.round_dp(dp),
            fixed_opex: self.fixed_opex.round_dp(dp),
            degradation_cost: self.degradation_cost.round_dp(dp),
            total_opex: self.total_opex.round_dp(dp),
            depreciation: self.depreciation.round_dp(dp),
            ebit: self.ebit.round_dp(dp),
            accumulated_loss: self.accumulated_loss.round_dp(dp),
            taxable_income: self.taxable_income.round_dp(dp),
            income_tax: self.income_tax.round_dp(dp),
            net_profit: self.net_profit.round_dp(dp),
            battery_replacement_capex: self.battery_replacement_capex.round_dp(dp),
            project_cash_flow: self.project_cash_flow.round_dp(dp),
            principal_payment: self.principal_payment.round_dp(dp),
            interest_payment: self.interest_payment.round_dp(dp),
            equity_cash_flow: self.equity_cash_flow.round_dp(dp),
        }
    }
}

/// The full multi-year statement with its financing context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub years: Vec<YearlyRecord>,
    pub financing: FinancingSplit,
    pub debt_schedule: Vec<DebtScheduleRow>,
}

/// Build the year-by-year project and equity cash-flow statement.
///
/// Constant revenue/cost components are computed once; arbitrage and
/// subsidy are recomputed each year at that year's degraded
/// efficiency, passed explicitly so the baseline parameters stay
/// untouched.
pub fn build_statement(params: &ParameterSet) -> StorageEconResult<CashFlowStatement> {
    params.validate()?;

    let lifespan = params.technical.lifespan_years;
    let split = financing::financing_split(params);
    let debt_schedule = financing::debt_service_schedule(params, split.loan_amount)?;

    let capacity_revenue = revenue::capacity_revenue(params);
    let ancillary_revenue = revenue::ancillary_revenue(params);
    let demand_response_revenue = revenue::demand_response_revenue(params);
    let grid_deferral_value = revenue::grid_deferral_value(params)?;
    let fixed_opex = costs::fixed_opex(params).total;

    let mut accumulated_depreciation = Decimal::ZERO;
    let mut losses = LossCarryforward::new(params.financial.loss_carryforward_years);
    let mut years = Vec::with_capacity(lifespan as usize);

    for year in 1..=lifespan {
        let efficiency = params.technical.efficiency_in_year(year);

        let arbitrage = revenue::arbitrage(params, efficiency);
        let subsidy = revenue::subsidy_revenue(params, efficiency);

        let total_revenue = arbitrage.gross_revenue
            + capacity_revenue
            + ancillary_revenue
            + demand_response_revenue
            + grid_deferral_value
            + subsidy;

        let total_opex = fixed_opex + arbitrage.degradation_cost;

        let depreciation = tax::depreciation(
            params.financial.depreciation_method,
            split.net_investment,
            lifespan,
            accumulated_depreciation,
        );
        accumulated_depreciation += depreciation;

        let ebit = total_revenue - total_opex - depreciation;

        // Offsetting also drops entries whose window lapsed, so the
        // balance reported below never includes expired losses.
        let deduction = losses.offset(year, ebit);
        let taxable_income = if ebit < Decimal::ZERO {
            losses.record_loss(year, ebit.abs());
            Decimal::ZERO
        } else {
            ebit - deduction
        };

        let income_tax = tax::income_tax(taxable_income, params.financial.income_tax_rate);
        let net_profit = ebit - income_tax;

        let capex = costs::battery_replacement_capex(params, year);
        let project_cash_flow = net_profit + depreciation - capex;

        let (principal_payment, interest_payment) = debt_schedule
            .iter()
            .find(|row| row.year == year)
            .map(|row| (row.principal_payment, row.interest_payment))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        let equity_cash_flow = project_cash_flow - principal_payment - interest_payment;

        years.push(YearlyRecord {
            year,
            arbitrage_revenue: arbitrage.gross_revenue,
            capacity_revenue,
            ancillary_revenue,
            demand_response_revenue,
            grid_deferral_value,
            subsidy_revenue: subsidy,
            total_revenue,
            fixed_opex,
            degradation_cost: arbitrage.degradation_cost,
            total_opex,
            depreciation,
            ebit,
            accumulated_loss: losses.balance(),
            taxable_income,
            income_tax,
            net_profit,
            battery_replacement_capex: capex,
            project_cash_flow,
            principal_payment,
            interest_payment,
            equity_cash_flow,
        });
    }

    Ok(CashFlowStatement {
        years,
        financing: split,
        debt_schedule,
    })
}
