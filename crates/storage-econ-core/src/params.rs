use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::StorageEconError;
use crate::types::{Money, Rate};
use crate::StorageEconResult;

/// Battery system technical specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalSpecs {
    /// Nameplate energy capacity in MWh
    pub capacity_mwh: Decimal,
    /// Rated power in MW
    pub max_power_mw: Decimal,
    /// Round-trip efficiency in year 1 (0.88 = 88%)
    pub round_trip_efficiency: Rate,
    /// Year-over-year efficiency decline rate
    #[serde(default)]
    pub annual_efficiency_degradation: Rate,
    /// Asset lifespan in years
    pub lifespan_years: u32,
    /// Usable depth of discharge per cycle
    pub depth_of_discharge: Rate,
    /// Rated cycle life (informational, not used by the cash-flow model)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub cycle_life: Option<u32>,
}

impl TechnicalSpecs {
    /// Usable energy per cycle in kWh.
    pub fn daily_energy_kwh(&self) -> Decimal {
        self.capacity_mwh * self.depth_of_discharge * dec!(1000)
    }

    /// Round-trip efficiency in the given project year (1-based),
    /// after compounding degradation.
    pub fn efficiency_in_year(&self, year: u32) -> Rate {
        let retained = Decimal::ONE - self.annual_efficiency_degradation;
        self.round_trip_efficiency * retained.powi(i64::from(year) - 1)
    }
}

/// Capital and operating cost assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostStructure {
    /// Total upfront investment, VAT inclusive
    pub total_investment: Money,
    /// Annual O&M cost as a fraction of total investment
    pub opex_rate: Rate,
    /// Annual land lease
    #[serde(default)]
    pub land_lease: Money,
    /// Annual insurance as a fraction of total investment
    #[serde(default)]
    pub insurance_rate: Rate,
    /// One-time battery replacement cost
    #[serde(default)]
    pub battery_replacement_cost: Money,
    /// Project year in which the replacement occurs
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub battery_replacement_year: Option<u32>,
    /// Investment tax credit as a fraction of net investment
    #[serde(default)]
    pub itc_rate: Rate,
}

/// Demand-response participation terms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemandResponse {
    pub enabled: bool,
    /// Demand charge saved, $/kW-month
    #[serde(default)]
    pub demand_charge: Money,
    /// Peak load reduction committed, kW
    #[serde(default)]
    pub load_reduction_kw: Decimal,
}

/// Transmission/distribution deferral terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDeferral {
    pub enabled: bool,
    /// One-time grid investment deferred
    #[serde(default)]
    pub deferred_investment: Money,
    /// Deferral horizon in years
    #[serde(default = "default_deferral_period")]
    pub deferral_period_years: u32,
}

fn default_deferral_period() -> u32 {
    1
}

impl Default for GridDeferral {
    fn default() -> Self {
        GridDeferral {
            enabled: false,
            deferred_investment: Decimal::ZERO,
            deferral_period_years: 1,
        }
    }
}

/// Market and policy revenue assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPolicy {
    /// Peak-valley price differential, $/kWh
    pub price_diff: Money,
    /// Capacity payment, $/MW-year
    #[serde(default)]
    pub capacity_price: Money,
    /// Ancillary services payment, $/MW-year
    #[serde(default)]
    pub ancillary_price: Money,
    /// Subsidy per kWh discharged
    #[serde(default)]
    pub subsidy_rate: Money,
    #[serde(default)]
    pub demand_response: DemandResponse,
    #[serde(default)]
    pub grid_deferral: GridDeferral,
}

/// Debt repayment profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentType {
    /// Level annual payment (annuity)
    #[default]
    EqualInstallment,
    /// Constant principal, declining total payment
    EqualPrincipal,
}

/// Depreciation method for the tax model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepreciationMethod {
    #[default]
    StraightLine,
    DoubleDeclining,
}

/// Capital-structure assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Financing {
    /// Debt share of net investment, [0, 1]
    #[serde(default)]
    pub debt_ratio: Rate,
    #[serde(default = "default_loan_term")]
    pub loan_term_years: u32,
    #[serde(default)]
    pub loan_rate: Rate,
    #[serde(default)]
    pub repayment_type: RepaymentType,
}

fn default_loan_term() -> u32 {
    10
}

impl Default for Financing {
    fn default() -> Self {
        Financing {
            debt_ratio: Decimal::ZERO,
            loan_term_years: 10,
            loan_rate: Decimal::ZERO,
            repayment_type: RepaymentType::EqualInstallment,
        }
    }
}

/// Normal distribution parameters for an uncertain input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NormalDistribution {
    pub mean: f64,
    pub std_dev: f64,
}

/// Monte Carlo risk-simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of simulation draws
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Optional seed for reproducibility
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub seed: Option<u64>,
    /// Soft deadline checked between draws
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub max_runtime_ms: Option<u64>,
    /// Distribution of the peak-valley price differential
    pub price_diff: NormalDistribution,
    /// Distribution of the total investment
    pub total_investment: NormalDistribution,
    /// Optional distribution of the debt ratio, clamped to [0, 0.8]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub debt_ratio: Option<NormalDistribution>,
}

fn default_num_simulations() -> u32 {
    5_000
}

/// Discounting, tax and financing assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialAssumptions {
    /// Project discount rate (WACC)
    pub discount_rate: Rate,
    /// Equity hurdle rate; defaults to discount_rate + 200 bps
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub equity_discount_rate: Option<Rate>,
    /// Full charge/discharge cycles per day
    pub cycles_per_day: Decimal,
    #[serde(default = "default_vat_rate")]
    pub vat_rate: Rate,
    #[serde(default = "default_income_tax_rate")]
    pub income_tax_rate: Rate,
    #[serde(default)]
    pub depreciation_method: DepreciationMethod,
    /// Battery wear cost per kWh cycled
    #[serde(default = "default_degradation_cost")]
    pub degradation_cost_per_kwh: Money,
    /// Loss-carryforward window in years; None = unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub loss_carryforward_years: Option<u32>,
    #[serde(default)]
    pub financing: Financing,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub monte_carlo: Option<MonteCarloConfig>,
}

fn default_vat_rate() -> Rate {
    dec!(0.13)
}

fn default_income_tax_rate() -> Rate {
    dec!(0.25)
}

fn default_degradation_cost() -> Money {
    dec!(0.05)
}

impl FinancialAssumptions {
    /// Equity hurdle rate, defaulting to the project rate plus 200 bps.
    pub fn equity_hurdle(&self) -> Rate {
        self.equity_discount_rate
            .unwrap_or(self.discount_rate + dec!(0.02))
    }
}

/// Complete, validated input for one analysis request.
///
/// Treated as immutable once built: every perturbed scenario is an
/// independent clone produced by one of the `with_*` constructors,
/// never a mutation of the shared baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSet {
    pub technical: TechnicalSpecs,
    pub cost: CostStructure,
    pub market: MarketPolicy,
    pub financial: FinancialAssumptions,
}

impl ParameterSet {
    /// Deserialize from JSON, reporting an absent required key as a
    /// structured `MissingField` error.
    pub fn from_json(value: serde_json::Value) -> StorageEconResult<Self> {
        serde_json::from_value(value).map_err(|e| {
            let msg = e.to_string();
            match missing_field_name(&msg) {
                Some(field) => StorageEconError::MissingField { field },
                None => StorageEconError::SerializationError(msg),
            }
        })
    }

    /// Semantic validation of field ranges. Called by the cash-flow
    /// engine before any computation.
    pub fn validate(&self) -> StorageEconResult<()> {
        let tech = &self.technical;
        if tech.lifespan_years == 0 {
            return invalid("technical.lifespan_years", "must be at least 1 year");
        }
        if tech.capacity_mwh <= Decimal::ZERO {
            return invalid("technical.capacity_mwh", "must be positive");
        }
        if tech.max_power_mw <= Decimal::ZERO {
            return invalid("technical.max_power_mw", "must be positive");
        }
        if tech.round_trip_efficiency <= Decimal::ZERO || tech.round_trip_efficiency > Decimal::ONE
        {
            return invalid("technical.round_trip_efficiency", "must be in (0, 1]");
        }
        if tech.annual_efficiency_degradation < Decimal::ZERO
            || tech.annual_efficiency_degradation >= Decimal::ONE
        {
            return invalid("technical.annual_efficiency_degradation", "must be in [0, 1)");
        }
        if tech.depth_of_discharge <= Decimal::ZERO || tech.depth_of_discharge > Decimal::ONE {
            return invalid("technical.depth_of_discharge", "must be in (0, 1]");
        }

        let cost = &self.cost;
        if cost.total_investment <= Decimal::ZERO {
            return invalid("cost.total_investment", "must be positive");
        }
        if cost.opex_rate < Decimal::ZERO {
            return invalid("cost.opex_rate", "must be non-negative");
        }
        if cost.itc_rate < Decimal::ZERO || cost.itc_rate > Decimal::ONE {
            return invalid("cost.itc_rate", "must be in [0, 1]");
        }
        if let Some(year) = cost.battery_replacement_year {
            if year == 0 {
                return invalid("cost.battery_replacement_year", "years are 1-based");
            }
        }

        let fin = &self.financial;
        if fin.discount_rate <= dec!(-1) {
            return invalid("financial.discount_rate", "must be greater than -100%");
        }
        if fin.cycles_per_day <= Decimal::ZERO {
            return invalid("financial.cycles_per_day", "must be positive");
        }
        if fin.vat_rate < Decimal::ZERO {
            return invalid("financial.vat_rate", "must be non-negative");
        }
        if fin.income_tax_rate < Decimal::ZERO || fin.income_tax_rate > Decimal::ONE {
            return invalid("financial.income_tax_rate", "must be in [0, 1]");
        }

        let financing = &fin.financing;
        if financing.debt_ratio < Decimal::ZERO || financing.debt_ratio > Decimal::ONE {
            return invalid("financial.financing.debt_ratio", "must be in [0, 1]");
        }
        if financing.debt_ratio > Decimal::ZERO {
            if financing.loan_term_years == 0 {
                return invalid("financial.financing.loan_term_years", "must be at least 1 year");
            }
            if financing.loan_rate < Decimal::ZERO {
                return invalid("financial.financing.loan_rate", "must be non-negative");
            }
        }

        let deferral = &self.market.grid_deferral;
        if deferral.enabled && deferral.deferral_period_years == 0 {
            return invalid(
                "market.grid_deferral.deferral_period_years",
                "must be at least 1 year",
            );
        }

        Ok(())
    }

    // Clone-with-override constructors. One per perturbable input so
    // the perturbation intent is explicit at the call site.

    pub fn with_price_diff(&self, value: Money) -> Self {
        let mut clone = self.clone();
        clone.market.price_diff = value;
        clone
    }

    pub fn with_total_investment(&self, value: Money) -> Self {
        let mut clone = self.clone();
        clone.cost.total_investment = value;
        clone
    }

    pub fn with_debt_ratio(&self, value: Rate) -> Self {
        let mut clone = self.clone();
        clone.financial.financing.debt_ratio = value;
        clone
    }

    pub fn with_loan_rate(&self, value: Rate) -> Self {
        let mut clone = self.clone();
        clone.financial.financing.loan_rate = value;
        clone
    }

    pub fn with_ancillary_price(&self, value: Money) -> Self {
        let mut clone = self.clone();
        clone.market.ancillary_price = value;
        clone
    }

    pub fn with_opex_rate(&self, value: Rate) -> Self {
        let mut clone = self.clone();
        clone.cost.opex_rate = value;
        clone
    }
}

fn invalid(field: &str, reason: &str) -> StorageEconResult<()> {
    Err(StorageEconError::InvalidInput {
        field: field.into(),
        reason: reason.into(),
    })
}

/// Extract the field name from a serde "missing field `x`" message.
fn missing_field_name(msg: &str) -> Option<String> {
    let rest = msg.strip_prefix("missing field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
pub(crate) fn test_params() -> ParameterSet {
    ParameterSet {
        technical: TechnicalSpecs {
            capacity_mwh: dec!(10),
            max_power_mw: dec!(5),
            round_trip_efficiency: dec!(0.88),
            annual_efficiency_degradation: dec!(0.02),
            lifespan_years: 15,
            depth_of_discharge: dec!(0.9),
            cycle_life: Some(6000),
        },
        cost: CostStructure {
            total_investment: dec!(10000000),
            opex_rate: dec!(0.02),
            land_lease: dec!(20000),
            insurance_rate: dec!(0.005),
            battery_replacement_cost: dec!(1500000),
            battery_replacement_year: Some(10),
            itc_rate: dec!(0.1),
        },
        market: MarketPolicy {
            price_diff: dec!(0.12),
            capacity_price: dec!(40000),
            ancillary_price: dec!(15000),
            subsidy_rate: dec!(0.01),
            demand_response: DemandResponse {
                enabled: true,
                demand_charge: dec!(12),
                load_reduction_kw: dec!(2000),
            },
            grid_deferral: GridDeferral {
                enabled: true,
                deferred_investment: dec!(800000),
                deferral_period_years: 10,
            },
        },
        financial: FinancialAssumptions {
            discount_rate: dec!(0.08),
            equity_discount_rate: None,
            cycles_per_day: dec!(1),
            vat_rate: dec!(0.13),
            income_tax_rate: dec!(0.25),
            depreciation_method: DepreciationMethod::StraightLine,
            degradation_cost_per_kwh: dec!(0.05),
            loss_carryforward_years: None,
            financing: Financing {
                debt_ratio: dec!(0.6),
                loan_term_years: 10,
                loan_rate: dec!(0.05),
                repayment_type: RepaymentType::EqualInstallment,
            },
            monte_carlo: None,
        },
    }
}
