//! # Entity Index - Transactional Ordered Record Store
//!
//! An embedded index mapping small fixed-size records ("entities") to stable
//! integer ids while keeping them ordered by a user-defined key. Typical
//! entities are the players, tournaments or sources of a game database; each
//! entity type plugs into the same engine through a serializer.
//!
//! ## Key Features
//!
//! - **Dual addressing**: look up entities by id or by key
//! - **Balanced tree over ids**: an AVL tree stored in fixed-size node slots,
//!   without parent links
//! - **Transactions**: copy-on-write change sets with optimistic version checks
//! - **Id recycling**: deleted ids are reused from a free list
//! - **Storage backends**: in-memory and single-file stores
//! - **Validation**: a structural check of the tree and the free list
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use entity_index::entity_index::EntityIndex;
//! use entity_index::store::file::FileStoreModule;
//!
//! let index = EntityIndex::builder(PlayerSerializer)
//!     .load_module(FileStoreModule::with_config().file_path("players.idx").build())
//!     .open_or_create()?;
//!
//! let mut txn = index.begin_transaction()?;
//! let tal = txn.add(&Player::new("Tal, Mikhail"))?;
//! txn.update_stats(tal.id(), 1, 0)?;
//! txn.commit()?;
//!
//! for player in index.iter_ascending()? {
//!     println!("{:?}", player?);
//! }
//! index.close()?;
//! ```
//!
//! ## Module Organization
//!
//! - [`entity`] - Entity traits, the node record and the index header
//! - [`store`] - Node storage backends and their configuration
//! - [`tree`] - Node paths, the AVL algorithms and the structural validator
//! - [`transaction`] - Snapshots and transactions
//! - [`iters`] - Id-ordered and key-ordered iterators
//! - [`entity_index`] - The index facade
//! - [`index_builder`] - Builder for opening an index
//! - [`index_config`] - Index settings
//! - [`errors`] - Error types and result definitions
//! - [`common`] - Constants, locks and the event bus

pub mod common;
pub mod entity;
pub mod entity_index;
pub mod errors;
pub mod index_builder;
pub mod index_config;
pub mod iters;
pub mod store;
pub mod transaction;
pub mod tree;

#[cfg(test)]
mod test_support;
