//! GnuCash book storage
//!
//! Reads the records the reclassifier works on from a GnuCash SQLite book
//! and writes split changes back, holding the GnuCash lock in between.

pub mod error;
pub mod types;
pub mod sqlite;

#[cfg(any(test, feature = "testing"))]
pub mod schema;

pub use error::{StoreError, StoreResult};
pub use sqlite::{OpenMode, SqliteSession};

// Re-export commonly used types
pub use types::{
    AccountRecord, BookRecords, CommodityRecord, Numeric, PriceRecord, SplitRecord,
    SplitUpdate, TransactionRecord, parse_timestamp,
};

// ==================== Store Trait ====================

/// Source and sink of book data
pub trait BookStore {
    /// Read every record the reclassifier needs
    fn load(&self) -> StoreResult<BookRecords>;

    /// Persist split changes atomically
    fn save(&mut self, updates: &[SplitUpdate]) -> StoreResult<()>;
}
