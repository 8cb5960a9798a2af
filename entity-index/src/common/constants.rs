/// Child id marking an absent child and the root id of an empty tree.
pub const NO_NODE: i32 = -1;
/// Left child id marking a deleted node; its right child id then links the free list.
pub const DELETED_NODE: i32 = -999;

/// Magic constant stored in every index header.
pub const INDEX_MAGIC: i32 = 0x0D_4E58;

/// Bytes of a node slot that precede the serialized entity:
/// left child id (4), right child id (4) and balance factor (1).
pub const NODE_OVERHEAD: usize = 9;
/// Bytes at the end of every serialized entity holding usage count and first reference id.
pub const STATS_SIZE: usize = 8;

/// Size of the header written by this version.
pub const HEADER_SIZE: usize = 32;
/// Smallest header that still holds every known field.
pub const MIN_HEADER_SIZE: usize = 28;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_DEPTH: usize = 40;
pub const DEFAULT_CACHE_SIZE: usize = 1024;

pub const INDEX_EVENT: &str = "entity_index_event";
