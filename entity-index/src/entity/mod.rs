//! Entities, their binary form and the fixed-size records that hold them.
//!
//! An index is generic over one entity type. The entity describes how two
//! entities are ordered; an [`EntitySerializer`] turns an entity into exactly
//! `payload_size` bytes and back. The index itself appends the two maintained
//! statistics (usage count and first reference id) after the payload, so the
//! serialized size stored in the header is `payload_size + 8`.

mod codec;
mod header;
mod node;

pub use codec::*;
pub use header::*;
pub use node::*;

use crate::errors::IndexResult;
use std::cmp::Ordering;
use std::fmt::Debug;

/// A record stored in an entity index.
///
/// Entities are totally ordered by [`Entity::compare_key`]. Equal keys may
/// coexist in one index; by-key operations that would have to pick one of
/// several equal entities fail with a duplicate-key error instead.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    /// Id of the entity, or `-1` if it has not been stored yet.
    fn id(&self) -> i32;

    /// Returns a copy of this entity carrying `id`.
    fn with_id(&self, id: i32) -> Self;

    /// Number of references to this entity (e.g. games played by a player).
    fn usage_count(&self) -> i32;

    /// Id of the first referencing record, or `-1`.
    fn first_reference_id(&self) -> i32;

    /// Compares the sort keys of two entities.
    fn compare_key(&self, other: &Self) -> Ordering;
}

/// Converts one entity type to and from its fixed-size payload.
///
/// Implementations are provided by the owner of the entity type; the index
/// never looks inside the payload.
pub trait EntitySerializer<E: Entity>: Send + Sync {
    /// Exact number of payload bytes produced by [`EntitySerializer::serialize`].
    fn payload_size(&self) -> usize;

    /// Serializes the entity's payload fields (statistics excluded).
    fn serialize(&self, entity: &E) -> IndexResult<Vec<u8>>;

    /// Builds an entity from its id, statistics and payload bytes.
    fn deserialize(
        &self,
        id: i32,
        usage_count: i32,
        first_reference_id: i32,
        payload: &[u8],
    ) -> IndexResult<E>;
}
