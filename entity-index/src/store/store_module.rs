use crate::errors::IndexResult;
use crate::store::NodeStore;

/// Produces the node store an index is opened on.
pub trait StoreModule {
    fn get_store(&self) -> IndexResult<NodeStore>;
}
