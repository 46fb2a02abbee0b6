//! GnuCash SQLite session

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::types::{
    parse_timestamp, AccountRecord, BookRecords, CommodityRecord, Numeric, PriceRecord,
    SplitRecord, SplitUpdate, TransactionRecord,
};
use crate::BookStore;

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XML_MAGIC: &[u8] = b"<?xml";

/// Tables a book must provide
const REQUIRED_TABLES: &[&str] = &["books", "accounts", "commodities", "transactions", "splits", "prices"];

/// How to treat the GnuCash lock when opening a book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Refuse to open a book another process holds
    Normal,
    /// Read without locking; saving is refused
    ReadOnly,
    /// Remove any existing lock, then lock
    BreakLock,
}

/// Lock row this session owns in `gnclock`
#[derive(Debug, Clone, PartialEq, Eq)]
struct LockEntry {
    hostname: String,
    pid: i64,
}

impl LockEntry {
    fn current() -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id() as i64,
        }
    }
}

/// Open GnuCash book stored in SQLite
pub struct SqliteSession {
    conn: Connection,
    path: Option<PathBuf>,
    mode: OpenMode,
    lock: Option<LockEntry>,
}

impl SqliteSession {
    /// Open a book file
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        sniff_format(path)?;

        let flags = match mode {
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::Normal | OpenMode::BreakLock => OpenFlags::SQLITE_OPEN_READ_WRITE,
        };
        let conn = Connection::open_with_flags(path, flags)?;

        let mut session = Self::from_connection(conn, mode)?;
        session.path = Some(path.to_path_buf());
        log::info!("Opened book {} ({:?})", path.display(), mode);
        Ok(session)
    }

    /// Wrap an already open connection (e.g. an in-memory database)
    pub fn from_connection(conn: Connection, mode: OpenMode) -> StoreResult<Self> {
        check_schema(&conn)?;
        let mut session = Self {
            conn,
            path: None,
            mode,
            lock: None,
        };
        if mode != OpenMode::ReadOnly {
            session.acquire_lock()?;
        }
        Ok(session)
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Release the lock and close the book
    pub fn close(mut self) -> StoreResult<()> {
        self.release_lock()
    }

    fn acquire_lock(&mut self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS gnclock (Hostname varchar(255), PID int)",
            [],
        )?;

        if self.mode == OpenMode::BreakLock {
            let removed = self.conn.execute("DELETE FROM gnclock", [])?;
            if removed > 0 {
                log::warn!("Broke {} existing lock(s) on the book", removed);
            }
        }

        let holder: Option<(String, i64)> = self
            .conn
            .query_row("SELECT Hostname, PID FROM gnclock LIMIT 1", [], |row| {
                Ok((row.get::<_, Option<String>>(0)?.unwrap_or_default(), row.get::<_, Option<i64>>(1)?.unwrap_or(0)))
            })
            .optional()?;
        if let Some((hostname, pid)) = holder {
            return Err(StoreError::Locked { hostname, pid });
        }

        let entry = LockEntry::current();
        self.conn.execute(
            "INSERT INTO gnclock (Hostname, PID) VALUES (?1, ?2)",
            params![entry.hostname, entry.pid],
        )?;
        log::debug!("Locked book as {} (pid {})", entry.hostname, entry.pid);
        self.lock = Some(entry);
        Ok(())
    }

    fn release_lock(&mut self) -> StoreResult<()> {
        if let Some(entry) = self.lock.take() {
            self.conn.execute(
                "DELETE FROM gnclock WHERE Hostname = ?1 AND PID = ?2",
                params![entry.hostname, entry.pid],
            )?;
            log::debug!("Released book lock");
        }
        Ok(())
    }

    fn load_root_guid(&self) -> StoreResult<String> {
        self.conn
            .query_row("SELECT root_account_guid FROM books LIMIT 1", [], |row| row.get(0))
            .optional()?
            .ok_or_else(|| StoreError::InvalidData {
                message: "the books table is empty".to_string(),
            })
    }

    fn load_commodities(&self) -> StoreResult<Vec<CommodityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT guid, mnemonic, fraction FROM commodities ORDER BY rowid",
        )?;
        let commodities = stmt
            .query_map([], |row| {
                Ok(CommodityRecord {
                    guid: row.get(0)?,
                    mnemonic: row.get(1)?,
                    fraction: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(commodities)
    }

    fn load_accounts(&self) -> StoreResult<Vec<AccountRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT guid, name, commodity_guid, parent_guid, commodity_scu, non_std_scu
             FROM accounts ORDER BY rowid",
        )?;
        let accounts = stmt
            .query_map([], |row| {
                Ok(AccountRecord {
                    guid: row.get(0)?,
                    name: row.get(1)?,
                    commodity_guid: row.get(2)?,
                    parent_guid: row.get(3)?,
                    commodity_scu: row.get(4)?,
                    non_std_scu: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(accounts)
    }

    fn load_transactions(&self) -> StoreResult<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT guid, currency_guid, num, post_date, enter_date, description
             FROM transactions ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(guid, currency_guid, num, post, enter, description)| {
                let post_date = parse_optional_timestamp(&guid, "post_date", post)?;
                let enter_date = parse_optional_timestamp(&guid, "enter_date", enter)?;
                Ok(TransactionRecord {
                    guid,
                    currency_guid,
                    num,
                    post_date,
                    enter_date,
                    description: description.unwrap_or_default(),
                })
            })
            .collect()
    }

    fn load_splits(&self) -> StoreResult<Vec<SplitRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT guid, tx_guid, account_guid, value_num, value_denom, quantity_num, quantity_denom
             FROM splits ORDER BY rowid",
        )?;
        let splits = stmt
            .query_map([], |row| {
                Ok(SplitRecord {
                    guid: row.get(0)?,
                    tx_guid: row.get(1)?,
                    account_guid: row.get(2)?,
                    value: Numeric::new(row.get(3)?, row.get(4)?),
                    quantity: Numeric::new(row.get(5)?, row.get(6)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(splits)
    }

    fn load_prices(&self) -> StoreResult<Vec<PriceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT guid, commodity_guid, currency_guid, date, value_num, value_denom
             FROM prices ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    Numeric::new(row.get(4)?, row.get(5)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(guid, commodity_guid, currency_guid, date, value)| {
                let date = parse_timestamp(&date).ok_or_else(|| StoreError::InvalidData {
                    message: format!("price {} has an unreadable date '{}'", guid, date),
                })?;
                Ok(PriceRecord {
                    guid,
                    commodity_guid,
                    currency_guid,
                    date,
                    value,
                })
            })
            .collect()
    }
}

impl BookStore for SqliteSession {
    fn load(&self) -> StoreResult<BookRecords> {
        let records = BookRecords {
            root_account_guid: self.load_root_guid()?,
            commodities: self.load_commodities()?,
            accounts: self.load_accounts()?,
            transactions: self.load_transactions()?,
            splits: self.load_splits()?,
            prices: self.load_prices()?,
        };
        log::debug!(
            "Loaded {} accounts, {} transactions, {} splits, {} prices",
            records.accounts.len(),
            records.transactions.len(),
            records.splits.len(),
            records.prices.len()
        );
        Ok(records)
    }

    fn save(&mut self, updates: &[SplitUpdate]) -> StoreResult<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(StoreError::ReadOnly);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE splits SET account_guid = ?1, quantity_num = ?2, quantity_denom = ?3 WHERE guid = ?4",
            )?;
            for update in updates {
                let changed = stmt.execute(params![
                    update.account_guid,
                    update.quantity.num,
                    update.quantity.denom,
                    update.split_guid
                ])?;
                if changed != 1 {
                    // Dropping `tx` rolls back everything written so far
                    return Err(StoreError::SplitNotFound {
                        guid: update.split_guid.clone(),
                    });
                }
            }
        }
        tx.commit()?;
        log::info!("Saved {} split update(s)", updates.len());
        Ok(())
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if let Err(e) = self.release_lock() {
            log::warn!("Failed to release book lock: {}", e);
        }
    }
}

fn parse_optional_timestamp(guid: &str, column: &str, value: Option<String>) -> StoreResult<Option<chrono::NaiveDateTime>> {
    match value {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => parse_timestamp(&text).map(Some).ok_or_else(|| StoreError::InvalidData {
            message: format!("transaction {} has an unreadable {} '{}'", guid, column, text),
        }),
    }
}

/// Reject files that are not SQLite databases before handing them to SQLite
fn sniff_format(path: &Path) -> StoreResult<()> {
    let mut header = [0u8; 16];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;
    let header = &header[..read];

    if header.starts_with(SQLITE_MAGIC) {
        return Ok(());
    }
    let format = if header.starts_with(GZIP_MAGIC) {
        "compressed GnuCash XML"
    } else if header.starts_with(XML_MAGIC) {
        "GnuCash XML"
    } else {
        "unknown"
    };
    Err(StoreError::UnsupportedFormat {
        path: path.display().to_string(),
        format: format.to_string(),
    })
}

fn check_schema(conn: &Connection) -> StoreResult<()> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    for table in REQUIRED_TABLES {
        if !stmt.exists(params![table])? {
            return Err(StoreError::MissingTable {
                table: table.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FixtureBook;
    use chrono::NaiveDate;
    use std::io::Write;

    fn fixture(conn: &Connection) {
        let book = FixtureBook::create(conn, "root").unwrap();
        book.commodity("usd", "USD").unwrap()
            .commodity("eur", "EUR").unwrap()
            .account("assets", "Assets", "ASSET", "usd", "root").unwrap()
            .account("bank", "Bank", "BANK", "usd", "assets").unwrap()
            .account("imb", "Imbalance-USD", "BANK", "usd", "root").unwrap()
            .transaction("t1", "usd", "2026-03-15 10:59:00", "GROCER").unwrap()
            .split("s1", "t1", "bank", Numeric::new(-1250, 100), Numeric::new(-1250, 100)).unwrap()
            .split("s2", "t1", "imb", Numeric::new(1250, 100), Numeric::new(1250, 100)).unwrap()
            .price(
                "p1",
                "usd",
                "eur",
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                Numeric::new(92, 100),
            )
            .unwrap();
    }

    fn book_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        fixture(&conn);
        file
    }

    #[test]
    fn test_load_records() {
        let conn = Connection::open_in_memory().unwrap();
        fixture(&conn);
        let session = SqliteSession::from_connection(conn, OpenMode::Normal).unwrap();
        let records = session.load().unwrap();

        assert_eq!(records.root_account_guid, "root");
        assert_eq!(records.commodities.len(), 2);
        assert_eq!(records.accounts.len(), 4);
        assert_eq!(records.accounts[0].commodity_guid, None);
        assert_eq!(records.accounts[1].commodity_scu, 100);
        assert!(!records.accounts[1].non_std_scu);
        assert_eq!(records.accounts[2].parent_guid.as_deref(), Some("assets"));
        assert_eq!(records.transactions.len(), 1);
        assert_eq!(records.transactions[0].description, "GROCER");
        assert_eq!(
            records.transactions[0].post_date,
            NaiveDate::from_ymd_opt(2026, 3, 15).unwrap().and_hms_opt(10, 59, 0)
        );
        assert_eq!(records.splits.len(), 2);
        assert_eq!(records.splits[1].quantity, Numeric::new(1250, 100));
        assert_eq!(records.prices[0].value, Numeric::new(92, 100));
    }

    #[test]
    fn test_save_updates_splits() {
        let conn = Connection::open_in_memory().unwrap();
        fixture(&conn);
        let mut session = SqliteSession::from_connection(conn, OpenMode::Normal).unwrap();

        session
            .save(&[SplitUpdate {
                split_guid: "s2".to_string(),
                account_guid: "assets".to_string(),
                quantity: Numeric::new(11500, 1000),
            }])
            .unwrap();

        let records = session.load().unwrap();
        let split = records.splits.iter().find(|s| s.guid == "s2").unwrap();
        assert_eq!(split.account_guid, "assets");
        assert_eq!(split.quantity, Numeric::new(11500, 1000));
        // Value stays in the transaction currency
        assert_eq!(split.value, Numeric::new(1250, 100));
    }

    #[test]
    fn test_save_unknown_split_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        fixture(&conn);
        let mut session = SqliteSession::from_connection(conn, OpenMode::Normal).unwrap();

        let result = session.save(&[
            SplitUpdate {
                split_guid: "s2".to_string(),
                account_guid: "assets".to_string(),
                quantity: Numeric::new(1, 1),
            },
            SplitUpdate {
                split_guid: "missing".to_string(),
                account_guid: "assets".to_string(),
                quantity: Numeric::new(1, 1),
            },
        ]);
        assert!(matches!(result, Err(StoreError::SplitNotFound { .. })));

        let records = session.load().unwrap();
        let split = records.splits.iter().find(|s| s.guid == "s2").unwrap();
        assert_eq!(split.account_guid, "imb");
    }

    #[test]
    fn test_lock_lifecycle() {
        let file = book_file();

        let session = SqliteSession::open(file.path(), OpenMode::Normal).unwrap();
        let second = SqliteSession::open(file.path(), OpenMode::Normal);
        assert!(matches!(second, Err(StoreError::Locked { .. })));

        // Read-only sessions ignore the lock
        assert!(SqliteSession::open(file.path(), OpenMode::ReadOnly).is_ok());

        session.close().unwrap();
        let reopened = SqliteSession::open(file.path(), OpenMode::Normal).unwrap();
        drop(reopened);

        let conn = Connection::open(file.path()).unwrap();
        let locks: i64 = conn.query_row("SELECT COUNT(*) FROM gnclock", [], |row| row.get(0)).unwrap();
        assert_eq!(locks, 0);
    }

    #[test]
    fn test_lock_row_names_this_process() {
        let conn = Connection::open_in_memory().unwrap();
        fixture(&conn);
        let session = SqliteSession::from_connection(conn, OpenMode::Normal).unwrap();

        let (hostname, pid): (String, i64) = session
            .connection()
            .query_row("SELECT Hostname, PID FROM gnclock", [], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert_eq!(hostname, gethostname::gethostname().to_string_lossy());
        assert!(!hostname.is_empty());
        assert_eq!(pid, std::process::id() as i64);
    }

    #[test]
    fn test_non_standard_scu_is_loaded() {
        let conn = Connection::open_in_memory().unwrap();
        fixture(&conn);
        FixtureBook::open(&conn).non_std_scu("bank", 1000).unwrap();
        let session = SqliteSession::from_connection(conn, OpenMode::ReadOnly).unwrap();

        let records = session.load().unwrap();
        let bank = records.accounts.iter().find(|a| a.guid == "bank").unwrap();
        assert_eq!(bank.commodity_scu, 1000);
        assert!(bank.non_std_scu);
    }

    #[test]
    fn test_break_lock() {
        let file = book_file();
        {
            let conn = Connection::open(file.path()).unwrap();
            conn.execute("INSERT INTO gnclock (Hostname, PID) VALUES ('elsewhere', 42)", []).unwrap();
        }

        let locked = SqliteSession::open(file.path(), OpenMode::Normal);
        match locked {
            Err(StoreError::Locked { hostname, pid }) => {
                assert_eq!(hostname, "elsewhere");
                assert_eq!(pid, 42);
            }
            _ => panic!("expected a lock error"),
        }

        assert!(SqliteSession::open(file.path(), OpenMode::BreakLock).is_ok());
    }

    #[test]
    fn test_read_only_refuses_save() {
        let file = book_file();
        let mut session = SqliteSession::open(file.path(), OpenMode::ReadOnly).unwrap();
        assert!(matches!(session.save(&[]), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn test_rejects_xml_books() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n<gnc-v2/>").unwrap();
        let result = SqliteSession::open(file.path(), OpenMode::Normal);
        assert!(matches!(result, Err(StoreError::UnsupportedFormat { ref format, .. }) if format == "GnuCash XML"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x1f, 0x8b, 0x08, 0x00]).unwrap();
        let result = SqliteSession::open(file.path(), OpenMode::Normal);
        assert!(matches!(result, Err(StoreError::UnsupportedFormat { ref format, .. }) if format == "compressed GnuCash XML"));
    }

    #[test]
    fn test_missing_file_and_tables() {
        let result = SqliteSession::open("/nonexistent/book.gnucash", OpenMode::Normal);
        assert!(matches!(result, Err(StoreError::FileNotFound { .. })));

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE books (guid text)").unwrap();
        let result = SqliteSession::from_connection(conn, OpenMode::Normal);
        assert!(matches!(result, Err(StoreError::MissingTable { ref table }) if table == "accounts"));
    }
}
