//! Rule-driven reclassification of imbalanced transactions

use std::collections::HashMap;
use std::io::Write;

use gnc_rules_config::RuleTable;
use gnc_rules_store::Numeric;
use gnc_rules_utils::format_report_line;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::book::Book;
use crate::error::{CoreError, CoreResult};
use crate::time::{MonthPeriod, TimeFilter};
use crate::types::{AccountId, TransactionId};

/// Decimal places kept of the raw converted quantity
pub const CONVERTED_SCALE: u32 = 3;

/// Counters of one reclassification run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclassifySummary {
    pub accounts_scanned: usize,
    /// Imbalanced transactions inside the period
    pub candidates: usize,
    pub reassigned: usize,
    /// Reassignments that needed a currency conversion
    pub converted: usize,
    /// Reassignments per destination path
    pub per_rule: HashMap<String, usize>,
}

impl std::fmt::Display for ReclassifySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} account(s) scanned, {} candidate(s), {} reassigned, {} converted",
            self.accounts_scanned, self.candidates, self.reassigned, self.converted
        )
    }
}

/// Applies a rule table to a book, writing one report line per reassignment
pub struct Reclassifier<'a, W: Write> {
    book: &'a mut Book,
    report: W,
}

impl<'a, W: Write> Reclassifier<'a, W> {
    pub fn new(book: &'a mut Book, report: W) -> Self {
        Self { book, report }
    }

    pub fn into_report(self) -> W {
        self.report
    }

    /// Scan each account in turn and move matching imbalanced transactions
    /// to their rule's destination.
    ///
    /// Every scan path and destination is resolved before the first
    /// transaction is touched.
    pub fn run(
        &mut self,
        scan_paths: &[String],
        rules: &RuleTable,
        period: &MonthPeriod,
    ) -> CoreResult<ReclassifySummary> {
        let mut destinations = HashMap::new();
        for path in rules.destinations() {
            destinations.insert(path.to_string(), self.book.lookup_by_path(path)?);
        }
        let scan_accounts = scan_paths
            .iter()
            .map(|path| Ok((path.as_str(), self.book.lookup_by_path(path)?)))
            .collect::<CoreResult<Vec<_>>>()?;

        let mut summary = ReclassifySummary::default();
        for (path, account) in scan_accounts {
            log::info!("Scanning {} for {}", path, period);
            writeln!(self.report, "{}", path)?;
            summary.accounts_scanned += 1;

            let candidates: Vec<TransactionId> = self
                .book
                .transactions_for_account(account)
                .into_iter()
                .filter(|&id| self.book.transaction(id).filter_by_time(period))
                .filter(|&id| self.book.is_imbalanced(id))
                .collect();
            log::debug!("{} imbalanced transaction(s) in {}", candidates.len(), path);
            summary.candidates += candidates.len();

            for rule in rules.iter() {
                let destination = destinations[&rule.destination];
                for &id in &candidates {
                    if self.book.transaction(id).description != rule.trigger {
                        continue;
                    }
                    log::debug!(
                        "'{}' matches rule for {}",
                        self.book.transaction(id).summary(),
                        rule.destination
                    );
                    if self.set_destination(id, destination)? {
                        summary.converted += 1;
                    }
                    summary.reassigned += 1;
                    *summary.per_rule.entry(rule.destination.clone()).or_insert(0) += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Move the imbalanced split of a two-split transaction to `destination`.
    ///
    /// Returns true when the quantity had to be converted.
    fn set_destination(&mut self, id: TransactionId, destination: AccountId) -> CoreResult<bool> {
        let txn = self.book.transaction(id);

        let first = txn.splits.first().ok_or_else(|| CoreError::UnexpectedSplitCount {
            guid: txn.guid.clone(),
            description: txn.description.clone(),
            count: 0,
        })?;
        let amount = first.quantity.to_decimal().ok_or_else(|| CoreError::InvalidAmount {
            message: format!("split {} has quantity {}", first.guid, first.quantity),
        })?;
        let date = txn.post_date_local().unwrap_or_default();
        writeln!(self.report, "{}", format_report_line(date, &txn.description, amount))?;

        if txn.split_count() != 2 {
            return Err(CoreError::UnexpectedSplitCount {
                guid: txn.guid.clone(),
                description: txn.description.clone(),
                count: txn.split_count(),
            });
        }

        let (dest_index, source_index) = if self.book.is_split_imbalanced(&txn.splits[0]) {
            (0, 1)
        } else {
            (1, 0)
        };
        let source_account = txn.splits[source_index].account;
        let source_commodity = self.book.account_commodity(source_account)?;
        let dest_commodity = self.book.account_commodity(destination)?;

        let source_mnemonic = &self.book.commodity(source_commodity).mnemonic;
        let dest_mnemonic = &self.book.commodity(dest_commodity).mnemonic;
        if source_mnemonic == dest_mnemonic {
            self.book.reassign_split(id, dest_index, destination, None);
            return Ok(false);
        }

        let post_date = txn.post_date.unwrap_or_default();
        let rate = self
            .book
            .price_db()
            .lookup_nearest_in_time(source_commodity, dest_commodity, post_date)
            .ok_or_else(|| CoreError::PriceNotFound {
                commodity: source_mnemonic.clone(),
                currency: dest_mnemonic.clone(),
                date: post_date.format("%Y-%m-%d").to_string(),
            })?;
        log::debug!(
            "Converting {} -> {} at {} (quoted {}{})",
            source_mnemonic,
            dest_mnemonic,
            rate.value,
            rate.time,
            if rate.inverted { ", inverted" } else { "" }
        );

        let scu = self.book.account_scu(destination);
        let split = &txn.splits[dest_index];
        let quantity = convert_quantity(split.quantity, rate.value, scu).ok_or_else(|| CoreError::InvalidAmount {
            message: format!("cannot convert {} at rate {} into units of 1/{}", split.quantity, rate.value, scu),
        })?;
        self.book.reassign_split(id, dest_index, destination, Some(quantity));
        Ok(true)
    }
}

/// `quantity * rate` truncated to three places, then rounded half-up to
/// units of `1/scu` the way GnuCash stores a split amount
pub fn convert_quantity(quantity: Numeric, rate: Decimal, scu: i64) -> Option<Numeric> {
    if scu <= 0 {
        return None;
    }
    let converted = quantity
        .to_decimal()?
        .checked_mul(rate)?
        .round_dp_with_strategy(CONVERTED_SCALE, RoundingStrategy::ToZero);
    Numeric::from_decimal(converted, scu, RoundingStrategy::MidpointAwayFromZero)
}
