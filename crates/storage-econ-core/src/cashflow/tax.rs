use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::params::DepreciationMethod;
use crate::types::{Money, Rate};

/// Depreciation charge for one year.
///
/// Straight-line spreads the net investment evenly; double-declining
/// charges `2/lifespan` of net investment, clamped so the accumulated
/// total never exceeds the depreciable base.
pub fn depreciation(
    method: DepreciationMethod,
    net_investment: Money,
    lifespan_years: u32,
    accumulated: Money,
) -> Money {
    let lifespan = Decimal::from(lifespan_years);
    match method {
        DepreciationMethod::StraightLine => net_investment / lifespan,
        DepreciationMethod::DoubleDeclining => {
            let charge = net_investment * Decimal::TWO / lifespan;
            let remaining = net_investment - accumulated;
            charge.min(remaining).max(Decimal::ZERO)
        }
    }
}

/// Income tax on taxable income; never negative.
pub fn income_tax(taxable_income: Money, rate: Rate) -> Money {
    (taxable_income * rate).max(Decimal::ZERO)
}

/// Loss-carryforward ledger. Losses are tracked per year incurred so
/// an expiry window can be enforced; `window: None` carries losses
/// indefinitely.
#[derive(Debug, Clone)]
pub struct LossCarryforward {
    entries: VecDeque<(u32, Money)>,
    window: Option<u32>,
}

impl LossCarryforward {
    pub fn new(window: Option<u32>) -> Self {
        LossCarryforward {
            entries: VecDeque::new(),
            window,
        }
    }

    /// Outstanding deductible loss.
    pub fn balance(&self) -> Money {
        self.entries.iter().map(|(_, amount)| amount).sum()
    }

    /// Drop losses whose window has lapsed. A loss incurred in year y
    /// with window w is usable through year y + w.
    fn expire(&mut self, current_year: u32) {
        if let Some(window) = self.window {
            while let Some(&(incurred, _)) = self.entries.front() {
                if incurred + window < current_year {
                    self.entries.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Record a loss year.
    pub fn record_loss(&mut self, year: u32, amount: Money) {
        if amount > Decimal::ZERO {
            self.entries.push_back((year, amount));
        }
    }

    /// Offset positive EBIT against carried losses, oldest first.
    /// Returns the deduction applied; the taxable income is
    /// `ebit - deduction`.
    pub fn offset(&mut self, year: u32, ebit: Money) -> Money {
        self.expire(year);
        if ebit <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let mut remaining = ebit;
        let mut deducted = Decimal::ZERO;
        while remaining > Decimal::ZERO {
            match self.entries.front_mut() {
                Some((_, amount)) => {
                    let used = (*amount).min(remaining);
                    *amount -= used;
                    remaining -= used;
                    deducted += used;
                    if amount.is_zero() {
                        self.entries.pop_front();
                    }
                }
                None => break,
            }
        }
        deducted
    }
}
