use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::params::ParameterSet;
use crate::types::Money;

/// Fixed annual operating cost, broken out by driver. Constant across
/// the asset life; battery wear is costed separately per year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedOpex {
    pub base_opex: Money,
    pub land_lease: Money,
    pub insurance: Money,
    pub total: Money,
}

pub fn fixed_opex(params: &ParameterSet) -> FixedOpex {
    let cost = &params.cost;
    let base_opex = cost.total_investment * cost.opex_rate;
    let insurance = cost.total_investment * cost.insurance_rate;
    let total = base_opex + cost.land_lease + insurance;

    FixedOpex {
        base_opex,
        land_lease: cost.land_lease,
        insurance,
        total,
    }
}

/// Battery replacement capex: the full replacement cost in the
/// configured year, zero otherwise.
pub fn battery_replacement_capex(params: &ParameterSet, year: u32) -> Money {
    match params.cost.battery_replacement_year {
        Some(replacement_year) if replacement_year == year => params.cost.battery_replacement_cost,
        _ => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_params;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fixed_opex_breakdown() {
        let params = test_params();
        let opex = fixed_opex(&params);
        assert_eq!(opex.base_opex, dec!(200000));
        assert_eq!(opex.land_lease, dec!(20000));
        assert_eq!(opex.insurance, dec!(50000));
        assert_eq!(opex.total, dec!(270000));
    }

    #[test]
    fn test_replacement_only_in_configured_year() {
        let params = test_params();
        assert_eq!(battery_replacement_capex(&params, 9), Decimal::ZERO);
        assert_eq!(battery_replacement_capex(&params, 10), dec!(1500000));
        assert_eq!(battery_replacement_capex(&params, 11), Decimal::ZERO);
    }

    #[test]
    fn test_no_replacement_configured() {
        let mut params = test_params();
        params.cost.battery_replacement_year = None;
        assert_eq!(battery_replacement_capex(&params, 10), Decimal::ZERO);
    }
}
