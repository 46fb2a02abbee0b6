//! Book model and rule-based reclassification
//!
//! Loads a GnuCash book through a [`BookStore`], moves imbalanced
//! transactions of one month to the accounts named by the rules, and
//! writes the changed splits back.

pub mod book;
pub mod error;
pub mod models;
pub mod prices;
pub mod reclassify;
pub mod time;
pub mod types;

use std::io::Write;

use gnc_rules_config::RulesConfig;
use gnc_rules_store::BookStore;

pub use book::Book;
pub use error::{CoreError, CoreResult, DefaultErrorLogger, ErrorContext, ErrorLogger, ErrorSeverity};
pub use models::{Account, Commodity, Split, Transaction, IMBALANCE_PREFIX};
pub use prices::{Price, PriceDb, Rate};
pub use reclassify::{Reclassifier, ReclassifySummary};
pub use time::{MonthPeriod, TimeFilter};
pub use types::{AccountId, CommodityId, TransactionId};

// ==================== Run ====================

/// Switches for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Report what would change without saving
    pub dry_run: bool,
}

/// Apply the rules to one month of the book held by `store`.
///
/// Report lines go to `report`. Nothing is saved unless the whole run
/// succeeds, and nothing at all in dry-run mode.
pub fn apply_rules<S: BookStore, W: Write>(
    store: &mut S,
    config: &RulesConfig,
    period: &MonthPeriod,
    options: RunOptions,
    report: W,
) -> CoreResult<ReclassifySummary> {
    let rules = config.rule_table();
    let mut book = Book::from_records(store.load()?)?;
    log::debug!(
        "Book has {} transaction(s) and {} price(s)",
        book.transaction_count(),
        book.price_db().len()
    );

    let summary = {
        let mut reclassifier = Reclassifier::new(&mut book, report);
        let summary = reclassifier.run(&config.accounts_to_scan, &rules, period)?;
        reclassifier.into_report().flush()?;
        summary
    };
    log::info!("{}: {}", period, summary);
    for (destination, count) in &summary.per_rule {
        log::debug!("  {} <- {}", destination, count);
    }

    if !book.has_changes() {
        log::info!("No changes to save");
    } else if options.dry_run {
        log::warn!("Dry run: {} split change(s) not saved", book.pending_updates().len());
    } else {
        store.save(&book.pending_updates())?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gnc_rules_store::schema::FixtureBook;
    use gnc_rules_store::{Numeric, OpenMode, SqliteSession, StoreError};
    use rusqlite::{params, Connection};

    const RULES: &str = "
Accounts to scan:
  - 'Assets:Checking'
Rules:
  'Expenses:Groceries':
    - SUPERMARKET 42
  'Expenses:Travel':
    - AIRLINE
";

    fn fixture_session(mode: OpenMode) -> SqliteSession {
        let conn = Connection::open_in_memory().unwrap();
        {
            let book = FixtureBook::create(&conn, "root").unwrap();
            book.commodity("usd", "USD").unwrap()
                .commodity("eur", "EUR").unwrap()
                .account("assets", "Assets", "ASSET", "usd", "root").unwrap()
                .account("checking", "Checking", "BANK", "usd", "assets").unwrap()
                .account("expenses", "Expenses", "EXPENSE", "usd", "root").unwrap()
                .account("groceries", "Groceries", "EXPENSE", "usd", "expenses").unwrap()
                .account("travel", "Travel", "EXPENSE", "eur", "expenses").unwrap()
                .account("imbalance", "Imbalance-USD", "BANK", "usd", "root").unwrap()
                .transaction("t1", "usd", "2026-03-05 10:59:00", "SUPERMARKET 42").unwrap()
                .split("t1-a", "t1", "checking", Numeric::new(-1250, 100), Numeric::new(-1250, 100)).unwrap()
                .split("t1-b", "t1", "imbalance", Numeric::new(1250, 100), Numeric::new(1250, 100)).unwrap()
                .transaction("t2", "usd", "2026-03-14 10:59:00", "AIRLINE").unwrap()
                .split("t2-a", "t2", "checking", Numeric::new(-20000, 100), Numeric::new(-20000, 100)).unwrap()
                .split("t2-b", "t2", "imbalance", Numeric::new(20000, 100), Numeric::new(20000, 100)).unwrap()
                .transaction("t3", "usd", "2026-04-02 10:59:00", "SUPERMARKET 42").unwrap()
                .split("t3-a", "t3", "checking", Numeric::new(-500, 100), Numeric::new(-500, 100)).unwrap()
                .split("t3-b", "t3", "imbalance", Numeric::new(500, 100), Numeric::new(500, 100)).unwrap()
                .price("p1", "usd", "eur", at(2026, 3, 10), Numeric::new(9, 10)).unwrap()
                .price("p2", "usd", "eur", at(2026, 3, 20), Numeric::new(95, 100)).unwrap();
        }
        SqliteSession::from_connection(conn, mode).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(10, 59, 0).unwrap()
    }

    fn split_row(session: &SqliteSession, guid: &str) -> (String, i64, i64, i64) {
        session
            .connection()
            .query_row(
                "SELECT account_guid, quantity_num, quantity_denom, value_num FROM splits WHERE guid = ?1",
                params![guid],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap()
    }

    #[test]
    fn test_apply_rules_saves_changes() {
        let mut session = fixture_session(OpenMode::Normal);
        let config = RulesConfig::from_yaml(RULES).unwrap();
        let period = MonthPeriod::new(2026, 3).unwrap();
        let mut report = Vec::new();

        let summary = apply_rules(&mut session, &config, &period, RunOptions::default(), &mut report).unwrap();

        assert_eq!(summary.reassigned, 2);
        assert_eq!(summary.converted, 1);
        assert_eq!(split_row(&session, "t1-b"), ("groceries".to_string(), 1250, 100, 1250));
        // 200.00 USD at the 2026-03-10 rate of 0.9, in euro cents, value untouched
        assert_eq!(split_row(&session, "t2-b"), ("travel".to_string(), 18000, 100, 20000));
        // April is outside the period
        assert_eq!(split_row(&session, "t3-b").0, "imbalance");

        let report = String::from_utf8(report).unwrap();
        assert_eq!(report.lines().count(), 3);
    }

    #[test]
    fn test_converted_quantity_uses_account_unit() {
        let mut session = fixture_session(OpenMode::Normal);
        FixtureBook::open(session.connection()).non_std_scu("travel", 1000).unwrap();
        session
            .connection()
            .execute("UPDATE prices SET value_num = 11115, value_denom = 10000 WHERE guid = 'p1'", [])
            .unwrap();
        let config = RulesConfig::from_yaml(RULES).unwrap();
        let period = MonthPeriod::new(2026, 3).unwrap();

        apply_rules(&mut session, &config, &period, RunOptions::default(), Vec::new()).unwrap();
        assert_eq!(split_row(&session, "t2-b"), ("travel".to_string(), 222300, 1000, 20000));
    }

    #[test]
    fn test_legacy_account_types_load() {
        let mut session = fixture_session(OpenMode::Normal);
        for (guid, account_type) in [("checking", "CHECKING"), ("assets", "SAVINGS"), ("expenses", "NONE")] {
            session
                .connection()
                .execute("UPDATE accounts SET account_type = ?1 WHERE guid = ?2", params![account_type, guid])
                .unwrap();
        }
        let config = RulesConfig::from_yaml(RULES).unwrap();
        let period = MonthPeriod::new(2026, 3).unwrap();

        let summary = apply_rules(&mut session, &config, &period, RunOptions::default(), Vec::new()).unwrap();
        assert_eq!(summary.reassigned, 2);
        assert_eq!(split_row(&session, "t1-b").0, "groceries");
    }

    #[test]
    fn test_second_run_finds_nothing() {
        let mut session = fixture_session(OpenMode::Normal);
        let config = RulesConfig::from_yaml(RULES).unwrap();
        let period = MonthPeriod::new(2026, 3).unwrap();

        apply_rules(&mut session, &config, &period, RunOptions::default(), Vec::new()).unwrap();
        let summary = apply_rules(&mut session, &config, &period, RunOptions::default(), Vec::new()).unwrap();
        assert_eq!(summary.candidates, 0);
        assert_eq!(summary.reassigned, 0);
    }

    #[test]
    fn test_dry_run_leaves_book_untouched() {
        let mut session = fixture_session(OpenMode::ReadOnly);
        let config = RulesConfig::from_yaml(RULES).unwrap();
        let period = MonthPeriod::new(2026, 3).unwrap();
        let options = RunOptions { dry_run: true };

        let summary = apply_rules(&mut session, &config, &period, options, Vec::new()).unwrap();
        assert_eq!(summary.reassigned, 2);
        assert_eq!(split_row(&session, "t1-b").0, "imbalance");
        assert_eq!(split_row(&session, "t2-b").0, "imbalance");
    }

    #[test]
    fn test_read_only_session_refuses_save() {
        let mut session = fixture_session(OpenMode::ReadOnly);
        let config = RulesConfig::from_yaml(RULES).unwrap();
        let period = MonthPeriod::new(2026, 3).unwrap();

        let err = apply_rules(&mut session, &config, &period, RunOptions::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::ReadOnly)));
    }

    #[test]
    fn test_failed_run_saves_nothing() {
        let yaml = "
Accounts to scan: ['Assets:Checking']
Rules:
  'Expenses:Groceries': [SUPERMARKET 42]
  'Expenses:Dining': [BISTRO]
";
        let mut session = fixture_session(OpenMode::Normal);
        let config = RulesConfig::from_yaml(yaml).unwrap();
        let period = MonthPeriod::new(2026, 3).unwrap();

        let err = apply_rules(&mut session, &config, &period, RunOptions::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, CoreError::AccountNotFound { .. }));
        assert_eq!(split_row(&session, "t1-b").0, "imbalance");
    }
}
