use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::params::ParameterSet;
use crate::time_value;
use crate::types::{Money, Rate};
use crate::StorageEconResult;

const DAYS_PER_YEAR: Decimal = dec!(365);
const MONTHS_PER_YEAR: Decimal = dec!(12);

/// Peak-valley arbitrage for one year at the given degraded efficiency.
#[derive(Debug, Clone, Copy)]
pub struct ArbitrageYear {
    pub gross_revenue: Money,
    pub degradation_cost: Money,
}

/// Arbitrage revenue and the battery wear cost it implies. Revenue
/// scales with the year's round-trip efficiency; wear is charged on
/// the full energy cycled.
pub fn arbitrage(params: &ParameterSet, efficiency: Rate) -> ArbitrageYear {
    let daily_energy_kwh = params.technical.daily_energy_kwh();
    let annual_cycles = DAYS_PER_YEAR * params.financial.cycles_per_day;

    let gross_revenue = daily_energy_kwh * params.market.price_diff * efficiency * annual_cycles;
    let degradation_cost =
        daily_energy_kwh * params.financial.degradation_cost_per_kwh * annual_cycles;

    ArbitrageYear {
        gross_revenue,
        degradation_cost,
    }
}

/// Capacity payment, constant across years.
pub fn capacity_revenue(params: &ParameterSet) -> Money {
    params.technical.max_power_mw * params.market.capacity_price
}

/// Ancillary services payment, constant across years.
pub fn ancillary_revenue(params: &ParameterSet) -> Money {
    params.technical.max_power_mw * params.market.ancillary_price
}

/// Demand-response savings: avoided demand charges on the committed
/// peak-load reduction, zero when not participating.
pub fn demand_response_revenue(params: &ParameterSet) -> Money {
    let dr = &params.market.demand_response;
    if !dr.enabled {
        return Decimal::ZERO;
    }
    dr.demand_charge * dr.load_reduction_kw * MONTHS_PER_YEAR
}

/// Annualized value of deferring a one-time grid investment: the
/// capital recovery factor at the project discount rate, or an even
/// spread over the deferral period when the rate is not positive.
pub fn grid_deferral_value(params: &ParameterSet) -> StorageEconResult<Money> {
    let deferral = &params.market.grid_deferral;
    if !deferral.enabled {
        return Ok(Decimal::ZERO);
    }

    let rate = params.financial.discount_rate;
    if rate > Decimal::ZERO {
        let crf = time_value::capital_recovery_factor(rate, deferral.deferral_period_years)?;
        Ok(deferral.deferred_investment * crf)
    } else {
        Ok(deferral.deferred_investment / Decimal::from(deferral.deferral_period_years))
    }
}

/// Energy actually discharged in a year at the given efficiency, kWh.
pub fn annual_discharged_energy_kwh(params: &ParameterSet, efficiency: Rate) -> Decimal {
    params.technical.daily_energy_kwh() * efficiency * DAYS_PER_YEAR * params.financial.cycles_per_day
}

/// Per-kWh discharge subsidy, recomputed yearly from the degraded
/// throughput.
pub fn subsidy_revenue(params: &ParameterSet, efficiency: Rate) -> Money {
    annual_discharged_energy_kwh(params, efficiency) * params.market.subsidy_rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_params;

    #[test]
    fn test_arbitrage_scales_with_efficiency() {
        let params = test_params();
        let full = arbitrage(&params, dec!(0.88));
        let degraded = arbitrage(&params, dec!(0.44));
        assert_eq!(degraded.gross_revenue * dec!(2), full.gross_revenue);
        // Wear cost does not depend on efficiency
        assert_eq!(degraded.degradation_cost, full.degradation_cost);
    }

    #[test]
    fn test_arbitrage_values() {
        let params = test_params();
        // 10 MWh * 0.9 DoD = 9000 kWh/day
        let year = arbitrage(&params, dec!(0.88));
        assert_eq!(year.gross_revenue, dec!(9000) * dec!(0.12) * dec!(0.88) * dec!(365));
        assert_eq!(year.degradation_cost, dec!(9000) * dec!(0.05) * dec!(365));
    }

    #[test]
    fn test_constant_revenues() {
        let params = test_params();
        assert_eq!(capacity_revenue(&params), dec!(200000));
        assert_eq!(ancillary_revenue(&params), dec!(75000));
        // 12 $/kW-month * 2000 kW * 12 months
        assert_eq!(demand_response_revenue(&params), dec!(288000));
    }

    #[test]
    fn test_demand_response_disabled() {
        let mut params = test_params();
        params.market.demand_response.enabled = false;
        assert_eq!(demand_response_revenue(&params), Decimal::ZERO);
    }

    #[test]
    fn test_grid_deferral_scales_linearly() {
        let params = test_params();
        let base = grid_deferral_value(&params).unwrap();

        let mut doubled = params.clone();
        doubled.market.grid_deferral.deferred_investment = dec!(1600000);
        let twice = grid_deferral_value(&doubled).unwrap();

        assert_eq!(twice, base * dec!(2));
    }

    #[test]
    fn test_grid_deferral_zero_rate_spreads_evenly() {
        let mut params = test_params();
        params.financial.discount_rate = Decimal::ZERO;
        let value = grid_deferral_value(&params).unwrap();
        // 800,000 over 10 years
        assert_eq!(value, dec!(80000));
    }

    #[test]
    fn test_grid_deferral_negative_rate_spreads_evenly() {
        // A negative discount rate is valid project-wide; the deferral
        // falls back to the even spread instead of the CRF.
        let mut params = test_params();
        params.financial.discount_rate = dec!(-0.05);
        let value = grid_deferral_value(&params).unwrap();
        assert_eq!(value, dec!(80000));
    }

    #[test]
    fn test_grid_deferral_disabled() {
        let mut params = test_params();
        params.market.grid_deferral.enabled = false;
        assert_eq!(grid_deferral_value(&params).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_subsidy_tracks_degraded_throughput() {
        let params = test_params();
        let y1 = subsidy_revenue(&params, params.technical.efficiency_in_year(1));
        let y5 = subsidy_revenue(&params, params.technical.efficiency_in_year(5));
        assert!(y5 < y1);
    }
}
