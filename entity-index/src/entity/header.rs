use crate::common::{read_i32, write_i32, HEADER_SIZE, INDEX_MAGIC, MIN_HEADER_SIZE, NO_NODE};
use crate::entity::EntityNode;
use crate::errors::{ErrorKind, IndexError, IndexResult};

/// Per-index state persisted ahead of the node slots.
///
/// # On-disk layout
///
/// | offset | field |
/// |---|---|
/// | 0 | capacity |
/// | 4 | root node id |
/// | 8 | magic |
/// | 12 | serialized entity size |
/// | 16 | free list head id |
/// | 20 | live entity count |
/// | 24 | header size |
/// | 28 | reserved |
///
/// Every field is a little-endian `i32`. Bytes beyond the known fields of a
/// larger header are kept and written back unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexHeader {
    capacity: i32,
    root_node_id: i32,
    entity_byte_size: i32,
    free_list_head_id: i32,
    num_live_entities: i32,
    header_size: i32,
    trailing: Vec<u8>,
}

impl IndexHeader {
    /// Header of an empty index.
    pub fn new(entity_byte_size: usize) -> Self {
        IndexHeader {
            capacity: 0,
            root_node_id: NO_NODE,
            entity_byte_size: entity_byte_size as i32,
            free_list_head_id: NO_NODE,
            num_live_entities: 0,
            header_size: HEADER_SIZE as i32,
            trailing: Vec::new(),
        }
    }

    pub fn capacity(&self) -> i32 {
        self.capacity
    }

    pub fn root_node_id(&self) -> i32 {
        self.root_node_id
    }

    pub fn entity_byte_size(&self) -> usize {
        self.entity_byte_size as usize
    }

    pub fn free_list_head_id(&self) -> i32 {
        self.free_list_head_id
    }

    pub fn num_live_entities(&self) -> i32 {
        self.num_live_entities
    }

    pub fn header_size(&self) -> usize {
        self.header_size as usize
    }

    pub fn slot_size(&self) -> usize {
        EntityNode::slot_size(self.entity_byte_size())
    }

    /// Byte offset of the slot holding node `id`.
    pub fn slot_offset(&self, id: i32) -> u64 {
        self.header_size() as u64 + id as u64 * self.slot_size() as u64
    }

    pub(crate) fn set_capacity(&mut self, capacity: i32) {
        self.capacity = capacity;
    }

    pub(crate) fn set_root_node_id(&mut self, root_node_id: i32) {
        self.root_node_id = root_node_id;
    }

    pub(crate) fn set_free_list_head_id(&mut self, free_list_head_id: i32) {
        self.free_list_head_id = free_list_head_id;
    }

    pub(crate) fn set_num_live_entities(&mut self, num_live_entities: i32) {
        self.num_live_entities = num_live_entities;
    }

    /// Reads the total header size from the first [`MIN_HEADER_SIZE`] bytes.
    pub fn declared_size(prefix: &[u8]) -> IndexResult<usize> {
        if prefix.len() < MIN_HEADER_SIZE {
            return Err(IndexError::new(
                &format!("Index header is truncated at {} bytes", prefix.len()),
                ErrorKind::FileCorrupted,
            ));
        }

        let magic = read_i32(prefix, 8);
        if magic != INDEX_MAGIC {
            log::error!("Index header magic {:#x} does not match {:#x}", magic, INDEX_MAGIC);
            return Err(IndexError::new(
                &format!("Not an entity index file (magic {:#x})", magic),
                ErrorKind::FileCorrupted,
            ));
        }

        let size = read_i32(prefix, 24);
        if size < MIN_HEADER_SIZE as i32 {
            return Err(IndexError::new(
                &format!("Index header declares an invalid size of {}", size),
                ErrorKind::FileCorrupted,
            ));
        }
        Ok(size as usize)
    }

    /// Parses a complete header of [`IndexHeader::declared_size`] bytes.
    pub fn from_bytes(buf: &[u8]) -> IndexResult<Self> {
        let header_size = Self::declared_size(buf)?;
        if buf.len() < header_size {
            return Err(IndexError::new(
                &format!(
                    "Index header is {} bytes but declares {}",
                    buf.len(),
                    header_size
                ),
                ErrorKind::FileCorrupted,
            ));
        }

        if header_size > HEADER_SIZE {
            log::warn!(
                "Index header is {} bytes, only the first {} are understood",
                header_size,
                HEADER_SIZE
            );
        }

        let header = IndexHeader {
            capacity: read_i32(buf, 0),
            root_node_id: read_i32(buf, 4),
            entity_byte_size: read_i32(buf, 12),
            free_list_head_id: read_i32(buf, 16),
            num_live_entities: read_i32(buf, 20),
            header_size: header_size as i32,
            trailing: buf[HEADER_SIZE.min(header_size)..header_size].to_vec(),
        };

        if header.capacity < 0 || header.entity_byte_size < 0 || header.num_live_entities < 0 {
            return Err(IndexError::new(
                "Index header holds negative sizes",
                ErrorKind::FileCorrupted,
            ));
        }
        Ok(header)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.header_size()];
        write_i32(&mut buf, 0, self.capacity);
        write_i32(&mut buf, 4, self.root_node_id);
        write_i32(&mut buf, 8, INDEX_MAGIC);
        write_i32(&mut buf, 12, self.entity_byte_size);
        write_i32(&mut buf, 16, self.free_list_head_id);
        write_i32(&mut buf, 20, self.num_live_entities);
        write_i32(&mut buf, 24, self.header_size);
        if self.header_size() > HEADER_SIZE {
            buf[HEADER_SIZE..].copy_from_slice(&self.trailing);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_header_describes_empty_index() {
        let header = IndexHeader::new(40);
        assert_eq!(header.capacity(), 0);
        assert_eq!(header.root_node_id(), NO_NODE);
        assert_eq!(header.free_list_head_id(), NO_NODE);
        assert_eq!(header.num_live_entities(), 0);
        assert_eq!(header.header_size(), HEADER_SIZE);
        assert_eq!(header.slot_size(), 49);
        assert_eq!(header.slot_offset(2), 32 + 2 * 49);
    }

    #[test]
    fn test_header_bytes_round_trip() {
        let mut header = IndexHeader::new(16);
        header.set_capacity(10);
        header.set_root_node_id(4);
        header.set_free_list_head_id(7);
        header.set_num_live_entities(8);

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(read_i32(&bytes, 8), INDEX_MAGIC);
        assert_eq!(IndexHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let mut bytes = IndexHeader::new(16).to_bytes();
        write_i32(&mut bytes, 8, 0x1234);
        let err = IndexHeader::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::FileCorrupted);
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let bytes = IndexHeader::new(16).to_bytes();
        let err = IndexHeader::declared_size(&bytes[..12]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::FileCorrupted);
    }

    #[test]
    fn test_larger_header_keeps_unknown_bytes() {
        let mut bytes = IndexHeader::new(16).to_bytes();
        write_i32(&mut bytes, 24, 40);
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let header = IndexHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.header_size(), 40);
        assert_eq!(header.slot_offset(0), 40);
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn test_minimal_header_is_accepted() {
        let mut bytes = IndexHeader::new(16).to_bytes();
        write_i32(&mut bytes, 24, MIN_HEADER_SIZE as i32);
        bytes.truncate(MIN_HEADER_SIZE);

        let header = IndexHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.header_size(), MIN_HEADER_SIZE);
        assert_eq!(header.to_bytes(), bytes);
    }
}
