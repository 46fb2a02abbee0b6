//! Core data models for the book

use chrono::{Local, NaiveDateTime, TimeZone};
use gnc_rules_store::Numeric;

use super::types::{AccountId, CommodityId};

/// Leaf-name prefix of the accounts GnuCash creates for unbalanced value
pub const IMBALANCE_PREFIX: &str = "Imbalance-";

/// Commodity (currency, security) information
#[derive(Debug, Clone)]
pub struct Commodity {
    pub guid: String,
    /// Ticker or ISO code (e.g., "USD", "EUR")
    pub mnemonic: String,
    /// Smallest fraction (e.g., 100 for cents)
    pub fraction: i64,
}

/// Account node in the book's tree
#[derive(Debug, Clone)]
pub struct Account {
    pub guid: String,
    /// Leaf name (e.g., "Groceries")
    pub name: String,
    /// Commodity the account is denominated in (none for the root)
    pub commodity: Option<CommodityId>,
    pub parent: Option<AccountId>,
    /// Children in book order
    pub children: Vec<AccountId>,
    /// Account-specific smallest unit, used when `non_std_scu` is set
    pub commodity_scu: i64,
    pub non_std_scu: bool,
}

impl Account {
    /// Check if GnuCash parked unbalanced value in this account
    pub fn is_imbalance(&self) -> bool {
        self.name.starts_with(IMBALANCE_PREFIX)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// One leg of a transaction
#[derive(Debug, Clone)]
pub struct Split {
    pub guid: String,
    pub account: AccountId,
    /// Amount in the transaction currency
    pub value: Numeric,
    /// Amount in the account commodity
    pub quantity: Numeric,
}

/// Transaction information
#[derive(Debug, Clone)]
pub struct Transaction {
    pub guid: String,
    pub currency: CommodityId,
    pub num: String,
    /// Posting time as stored (UTC)
    pub post_date: Option<NaiveDateTime>,
    /// Entry time as stored (UTC)
    pub enter_date: Option<NaiveDateTime>,
    pub description: String,
    /// Splits in book order
    pub splits: Vec<Split>,
}

impl Transaction {
    /// Posting time as a wall-clock time in `tz`
    pub fn post_date_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<NaiveDateTime> {
        self.post_date.map(|utc| tz.from_utc_datetime(&utc).naive_local())
    }

    /// Posting time in the local time zone
    pub fn post_date_local(&self) -> Option<NaiveDateTime> {
        self.post_date_in(&Local)
    }

    /// Check if transaction involves a specific account
    pub fn involves_account(&self, account: AccountId) -> bool {
        self.splits.iter().any(|s| s.account == account)
    }

    pub fn split_count(&self) -> usize {
        self.splits.len()
    }

    /// Get a summary string
    pub fn summary(&self) -> String {
        match self.post_date_local() {
            Some(date) => format!("{} - {}", date.format("%Y-%m-%d"), self.description),
            None => self.description.clone(),
        }
    }
}
