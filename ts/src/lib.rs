//! taskstore - generic persistent record storage
//!
//! A small embedded database for structs that implement [`Record`]:
//! SQLite holds the canonical row plus a queryable secondary index built
//! from [`Record::indexed_fields`], a JSONL file per collection records
//! every write for audit/replay, and [`Store::sync`] takes a best-effort
//! git snapshot commit of the whole directory when it lives inside a repo.

pub mod error;
pub mod filter;
mod git;
pub mod record;
mod store;

pub use error::{StoreError, StoreResult};
pub use filter::{Filter, FilterOp};
pub use record::{IndexValue, Record, now_ms};
pub use store::Store;
