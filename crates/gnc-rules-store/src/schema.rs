//! GnuCash SQLite table layout and a fixture builder for tests
//!
//! The DDL matches the columns GnuCash itself creates for the tables the
//! session reads; other GnuCash tables are not needed by the reclassifier.

use rusqlite::{params, Connection};

use crate::types::{Numeric, TIMESTAMP_FORMAT};

pub const GNUCASH_TABLES: &str = "
CREATE TABLE books (
    guid text(32) PRIMARY KEY NOT NULL,
    root_account_guid text(32) NOT NULL,
    root_template_guid text(32) NOT NULL
);
CREATE TABLE commodities (
    guid text(32) PRIMARY KEY NOT NULL,
    namespace text(2048) NOT NULL,
    mnemonic text(2048) NOT NULL,
    fullname text(2048),
    cusip text(2048),
    fraction integer NOT NULL,
    quote_flag integer NOT NULL,
    quote_source text(2048),
    quote_tz text(2048)
);
CREATE TABLE accounts (
    guid text(32) PRIMARY KEY NOT NULL,
    name text(2048) NOT NULL,
    account_type text(2048) NOT NULL,
    commodity_guid text(32),
    commodity_scu integer NOT NULL,
    non_std_scu integer NOT NULL,
    parent_guid text(32),
    code text(2048),
    description text(2048),
    hidden integer,
    placeholder integer
);
CREATE TABLE transactions (
    guid text(32) PRIMARY KEY NOT NULL,
    currency_guid text(32) NOT NULL,
    num text(2048) NOT NULL,
    post_date text(19),
    enter_date text(19),
    description text(2048)
);
CREATE TABLE splits (
    guid text(32) PRIMARY KEY NOT NULL,
    tx_guid text(32) NOT NULL,
    account_guid text(32) NOT NULL,
    memo text(2048) NOT NULL,
    action text(2048) NOT NULL,
    reconcile_state text(1) NOT NULL,
    reconcile_date text(19),
    value_num bigint NOT NULL,
    value_denom bigint NOT NULL,
    quantity_num bigint NOT NULL,
    quantity_denom bigint NOT NULL,
    lot_guid text(32)
);
CREATE TABLE prices (
    guid text(32) PRIMARY KEY NOT NULL,
    commodity_guid text(32) NOT NULL,
    currency_guid text(32) NOT NULL,
    date text(19) NOT NULL,
    source text(2048),
    type text(2048),
    value_num bigint NOT NULL,
    value_denom bigint NOT NULL
);
CREATE TABLE gnclock (
    Hostname varchar(255),
    PID int
);
";

/// Create the GnuCash tables on an empty database
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(GNUCASH_TABLES)
}

/// Populates a GnuCash-shaped database one row at a time
pub struct FixtureBook<'a> {
    conn: &'a Connection,
}

impl<'a> FixtureBook<'a> {
    /// Create the tables and a book whose root account is `root_guid`
    pub fn create(conn: &'a Connection, root_guid: &str) -> rusqlite::Result<Self> {
        create_tables(conn)?;
        conn.execute(
            "INSERT INTO books (guid, root_account_guid, root_template_guid) VALUES ('book', ?1, 'template-root')",
            params![root_guid],
        )?;
        conn.execute(
            "INSERT INTO accounts (guid, name, account_type, commodity_guid, commodity_scu, non_std_scu, parent_guid, hidden, placeholder)
             VALUES (?1, 'Root Account', 'ROOT', NULL, 0, 0, NULL, 0, 0)",
            params![root_guid],
        )?;
        Ok(Self { conn })
    }

    /// Builder over a database whose tables already exist
    pub fn open(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn commodity(&self, guid: &str, mnemonic: &str) -> rusqlite::Result<&Self> {
        self.conn.execute(
            "INSERT INTO commodities (guid, namespace, mnemonic, fullname, fraction, quote_flag)
             VALUES (?1, 'CURRENCY', ?2, ?2, 100, 0)",
            params![guid, mnemonic],
        )?;
        Ok(self)
    }

    pub fn account(
        &self,
        guid: &str,
        name: &str,
        account_type: &str,
        commodity_guid: &str,
        parent_guid: &str,
    ) -> rusqlite::Result<&Self> {
        self.conn.execute(
            "INSERT INTO accounts (guid, name, account_type, commodity_guid, commodity_scu, non_std_scu, parent_guid, hidden, placeholder)
             VALUES (?1, ?2, ?3, ?4, 100, 0, ?5, 0, 0)",
            params![guid, name, account_type, commodity_guid, parent_guid],
        )?;
        Ok(self)
    }

    /// Give the account its own smallest unit instead of its commodity's
    pub fn non_std_scu(&self, account_guid: &str, scu: i64) -> rusqlite::Result<&Self> {
        self.conn.execute(
            "UPDATE accounts SET commodity_scu = ?1, non_std_scu = 1 WHERE guid = ?2",
            params![scu, account_guid],
        )?;
        Ok(self)
    }

    /// `post_date` uses the `YYYY-MM-DD HH:MM:SS` layout
    pub fn transaction(
        &self,
        guid: &str,
        currency_guid: &str,
        post_date: &str,
        description: &str,
    ) -> rusqlite::Result<&Self> {
        self.conn.execute(
            "INSERT INTO transactions (guid, currency_guid, num, post_date, enter_date, description)
             VALUES (?1, ?2, '', ?3, ?3, ?4)",
            params![guid, currency_guid, post_date, description],
        )?;
        Ok(self)
    }

    pub fn split(
        &self,
        guid: &str,
        tx_guid: &str,
        account_guid: &str,
        value: Numeric,
        quantity: Numeric,
    ) -> rusqlite::Result<&Self> {
        self.conn.execute(
            "INSERT INTO splits (guid, tx_guid, account_guid, memo, action, reconcile_state,
                                 value_num, value_denom, quantity_num, quantity_denom)
             VALUES (?1, ?2, ?3, '', '', 'n', ?4, ?5, ?6, ?7)",
            params![guid, tx_guid, account_guid, value.num, value.denom, quantity.num, quantity.denom],
        )?;
        Ok(self)
    }

    pub fn price(
        &self,
        guid: &str,
        commodity_guid: &str,
        currency_guid: &str,
        date: chrono::NaiveDateTime,
        value: Numeric,
    ) -> rusqlite::Result<&Self> {
        self.conn.execute(
            "INSERT INTO prices (guid, commodity_guid, currency_guid, date, source, type, value_num, value_denom)
             VALUES (?1, ?2, ?3, ?4, 'user:price', 'last', ?5, ?6)",
            params![
                guid,
                commodity_guid,
                currency_guid,
                date.format(TIMESTAMP_FORMAT).to_string(),
                value.num,
                value.denom
            ],
        )?;
        Ok(self)
    }
}
