//! Index factory functions for benchmarks

use crate::data_gen::{BenchPlayer, BenchPlayerSerializer};
use entity_index::entity_index::EntityIndex;
use entity_index::store::file::FileStoreModule;
use entity_index::store::memory::InMemoryStoreModule;
use std::sync::Once;
use tempfile::TempDir;
use uuid::Uuid;

/// Result type for store operations
pub type StoreResult<T> = Result<T, Box<dyn std::error::Error>>;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Context holding an index and the directory of its file, if any
pub struct BenchContext {
    index: EntityIndex<BenchPlayer>,
    // dropped after the index is closed
    _dir: Option<TempDir>,
}

impl BenchContext {
    pub fn index(&self) -> &EntityIndex<BenchPlayer> {
        &self.index
    }
}

impl Drop for BenchContext {
    fn drop(&mut self) {
        if let Err(e) = self.index.close() {
            log::warn!("Failed to close benchmark index: {}", e);
        }
    }
}

/// Create an in-memory index
pub fn create_inmemory_index() -> StoreResult<BenchContext> {
    init_logger();
    let index = EntityIndex::builder(BenchPlayerSerializer)
        .load_module(InMemoryStoreModule::new())
        .open_or_create()?;
    Ok(BenchContext { index, _dir: None })
}

/// Create an index backed by a file in a fresh temporary directory
pub fn create_file_index(cache_size: usize) -> StoreResult<BenchContext> {
    init_logger();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(format!("bench_{}.idx", Uuid::new_v4()));
    let module = FileStoreModule::with_config()
        .file_path(&path.to_string_lossy())
        .cache_size(cache_size)
        .build();
    let index = EntityIndex::builder(BenchPlayerSerializer)
        .load_module(module)
        .open_or_create()?;
    Ok(BenchContext {
        index,
        _dir: Some(dir),
    })
}

/// Add every player in one transaction
pub fn populate(ctx: &BenchContext, players: &[BenchPlayer]) -> StoreResult<()> {
    let mut txn = ctx.index().begin_transaction()?;
    for player in players {
        txn.add(player)?;
    }
    txn.commit()?;
    Ok(())
}
