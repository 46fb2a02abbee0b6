//! Price database: historical exchange rates between commodities

use chrono::NaiveDateTime;
use gnc_rules_store::Numeric;
use rust_decimal::Decimal;

use crate::types::CommodityId;

/// Recorded price of one unit of `commodity` in `currency`
#[derive(Debug, Clone)]
pub struct Price {
    pub commodity: CommodityId,
    pub currency: CommodityId,
    /// Quote time (UTC)
    pub time: NaiveDateTime,
    pub value: Numeric,
}

/// Rate chosen for a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    /// Units of the target commodity per unit of the source commodity
    pub value: Decimal,
    /// Quote time of the underlying price
    pub time: NaiveDateTime,
    /// True when the price was recorded in the opposite direction
    pub inverted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PriceDb {
    prices: Vec<Price>,
}

impl PriceDb {
    pub fn new(prices: Vec<Price>) -> Self {
        Self { prices }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Rate converting `commodity` into `currency`, taken from the price
    /// nearest in time to `at`.
    ///
    /// Prices quoted in either direction qualify; a reversed quote is
    /// inverted. On equal distance the earlier quote wins, then a direct
    /// quote over a reversed one.
    pub fn lookup_nearest_in_time(
        &self,
        commodity: CommodityId,
        currency: CommodityId,
        at: NaiveDateTime,
    ) -> Option<Rate> {
        self.prices
            .iter()
            .filter_map(|price| {
                let value = price.value.to_decimal()?;
                if price.commodity == commodity && price.currency == currency {
                    Some(Rate { value, time: price.time, inverted: false })
                } else if price.commodity == currency && price.currency == commodity {
                    let value = Decimal::ONE.checked_div(value)?;
                    Some(Rate { value, time: price.time, inverted: true })
                } else {
                    None
                }
            })
            .min_by_key(|rate| ((rate.time - at).abs(), rate.time, rate.inverted))
    }
}
