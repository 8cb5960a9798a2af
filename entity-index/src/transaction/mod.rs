//! Transactions and read snapshots.
//!
//! Reads go through an [`IndexSnapshot`], a view pinned to one committed
//! version. Writes go through an [`EntityTransaction`], which layers a
//! private change set over such a snapshot and flushes it on commit. Both
//! answer the queries of [`EntityReader`].

mod core;
mod entity_transaction;
mod reader;
mod snapshot;

pub use self::core::*;
pub use entity_transaction::*;
pub use reader::*;
pub use snapshot::*;
