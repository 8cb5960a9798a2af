//! Node storage backends.
//!
//! A [`NodeStore`] persists the fixed-size records of one index together with
//! its header. Stores are produced by a [`StoreModule`]:
//!
//! - [`memory::InMemoryStoreModule`] keeps every node in a vector
//! - [`file::FileStoreModule`] keeps nodes in fixed-size slots of a single file,
//!   optionally loading the whole file into memory instead

mod event;
mod node_store;
mod store_config;
mod store_module;

pub mod file;
pub mod memory;

pub use event::*;
pub use node_store::*;
pub use store_config::*;
pub use store_module::*;
