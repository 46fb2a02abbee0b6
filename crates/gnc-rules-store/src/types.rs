//! Record types read from and written to a GnuCash book

use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Timestamp layout used by GnuCash 2.6 and later
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp layout written by older GnuCash releases
pub const LEGACY_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parse a stored timestamp (UTC) in either the current or the legacy layout
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, LEGACY_TIMESTAMP_FORMAT))
        .ok()
}

/// Rational number as GnuCash stores amounts: `num / denom`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Numeric {
    pub num: i64,
    pub denom: i64,
}

impl Numeric {
    pub fn new(num: i64, denom: i64) -> Self {
        Self { num, denom }
    }

    pub fn zero() -> Self {
        Self { num: 0, denom: 1 }
    }

    /// Exact decimal value, `None` for a zero denominator
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from(self.num).checked_div(Decimal::from(self.denom))
    }

    /// Express `value` over `denom`, rounding digits the denominator cannot hold
    pub fn from_decimal(value: Decimal, denom: i64, strategy: RoundingStrategy) -> Option<Self> {
        let scaled = value
            .checked_mul(Decimal::from(denom))?
            .round_dp_with_strategy(0, strategy);
        Some(Self::new(scaled.to_i64()?, denom))
    }
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

/// Row of the `commodities` table
#[derive(Debug, Clone, PartialEq)]
pub struct CommodityRecord {
    pub guid: String,
    pub mnemonic: String,
    pub fraction: i64,
}

/// Row of the `accounts` table
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub guid: String,
    pub name: String,
    pub commodity_guid: Option<String>,
    pub parent_guid: Option<String>,
    /// Smallest unit of the account, honoured only when `non_std_scu` is set
    pub commodity_scu: i64,
    pub non_std_scu: bool,
}

/// Row of the `transactions` table
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub guid: String,
    pub currency_guid: String,
    pub num: String,
    pub post_date: Option<NaiveDateTime>,
    pub enter_date: Option<NaiveDateTime>,
    pub description: String,
}

/// Row of the `splits` table
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRecord {
    pub guid: String,
    pub tx_guid: String,
    pub account_guid: String,
    /// Amount in the transaction currency
    pub value: Numeric,
    /// Amount in the account commodity
    pub quantity: Numeric,
}

/// Row of the `prices` table
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub guid: String,
    pub commodity_guid: String,
    pub currency_guid: String,
    pub date: NaiveDateTime,
    pub value: Numeric,
}

/// Everything the reclassifier needs from a book
#[derive(Debug, Clone, Default)]
pub struct BookRecords {
    pub root_account_guid: String,
    pub commodities: Vec<CommodityRecord>,
    pub accounts: Vec<AccountRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub splits: Vec<SplitRecord>,
    pub prices: Vec<PriceRecord>,
}

/// Change to persist for one split
#[derive(Debug, Clone, PartialEq)]
pub struct SplitUpdate {
    pub split_guid: String,
    pub account_guid: String,
    pub quantity: Numeric,
}
