use crate::common::{read_i32, write_i32, STATS_SIZE};
use crate::entity::{Entity, EntityNode, EntitySerializer};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use std::sync::Arc;

/// Encodes entities into the serialized form kept in node records.
///
/// The serialized form is the serializer's payload followed by the usage
/// count and the first reference id, both little-endian `i32`.
pub struct EntityCodec<E: Entity> {
    serializer: Arc<dyn EntitySerializer<E>>,
}

impl<E: Entity> Clone for EntityCodec<E> {
    fn clone(&self) -> Self {
        EntityCodec {
            serializer: self.serializer.clone(),
        }
    }
}

impl<E: Entity> EntityCodec<E> {
    pub fn new<S: EntitySerializer<E> + 'static>(serializer: S) -> Self {
        EntityCodec {
            serializer: Arc::new(serializer),
        }
    }

    pub fn payload_size(&self) -> usize {
        self.serializer.payload_size()
    }

    /// Size of the serialized entity including the statistics.
    pub fn entity_size(&self) -> usize {
        self.serializer.payload_size() + STATS_SIZE
    }

    pub fn encode(&self, entity: &E) -> IndexResult<Vec<u8>> {
        let payload_size = self.payload_size();
        let mut bytes = self.serializer.serialize(entity)?;
        if bytes.len() != payload_size {
            log::error!(
                "Serializer produced {} bytes for entity {}, expected {}",
                bytes.len(),
                entity.id(),
                payload_size
            );
            return Err(IndexError::new(
                &format!(
                    "Serialized entity is {} bytes but the payload size is {}",
                    bytes.len(),
                    payload_size
                ),
                ErrorKind::EncodingError,
            ));
        }

        bytes.resize(payload_size + STATS_SIZE, 0);
        write_i32(&mut bytes, payload_size, entity.usage_count());
        write_i32(&mut bytes, payload_size + 4, entity.first_reference_id());
        Ok(bytes)
    }

    pub fn decode(&self, id: i32, bytes: &[u8]) -> IndexResult<E> {
        let payload_size = self.payload_size();
        if bytes.len() != payload_size + STATS_SIZE {
            return Err(IndexError::new(
                &format!(
                    "Entity {} has {} serialized bytes, expected {}",
                    id,
                    bytes.len(),
                    payload_size + STATS_SIZE
                ),
                ErrorKind::EncodingError,
            ));
        }

        let usage_count = read_i32(bytes, payload_size);
        let first_reference_id = read_i32(bytes, payload_size + 4);
        self.serializer
            .deserialize(id, usage_count, first_reference_id, &bytes[..payload_size])
    }

    /// Decodes the entity held by a live node.
    pub fn decode_node(&self, node: &EntityNode) -> IndexResult<E> {
        if node.is_deleted() {
            log::error!("Attempt to decode deleted node {}", node.id());
            return Err(IndexError::new(
                &format!("Node {} is deleted and holds no entity", node.id()),
                ErrorKind::IndexCorrupted,
            ));
        }
        self.decode(node.id(), node.serialized_entity())
    }

    /// Rewrites the statistics of an already serialized entity in place.
    pub fn write_stats(&self, bytes: &mut [u8], usage_count: i32, first_reference_id: i32) {
        let payload_size = self.payload_size();
        write_i32(bytes, payload_size, usage_count);
        write_i32(bytes, payload_size + 4, first_reference_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Rating, RatingSerializer};

    struct ShortSerializer;

    impl EntitySerializer<Rating> for ShortSerializer {
        fn payload_size(&self) -> usize {
            8
        }

        fn serialize(&self, _entity: &Rating) -> IndexResult<Vec<u8>> {
            Ok(vec![0u8; 3])
        }

        fn deserialize(&self, _: i32, _: i32, _: i32, _: &[u8]) -> IndexResult<Rating> {
            Ok(Rating::new(0))
        }
    }

    #[test]
    fn test_encode_appends_statistics() {
        let codec = EntityCodec::new(RatingSerializer);
        let mut rating = Rating::new(1500);
        rating.count = 7;
        rating.first_ref = 42;

        let bytes = codec.encode(&rating).unwrap();
        assert_eq!(bytes.len(), codec.entity_size());
        assert_eq!(read_i32(&bytes, codec.payload_size()), 7);
        assert_eq!(read_i32(&bytes, codec.payload_size() + 4), 42);

        let decoded = codec.decode(3, &bytes).unwrap();
        assert_eq!(decoded, rating.with_id(3));
    }

    #[test]
    fn test_encode_rejects_wrong_payload_size() {
        let codec = EntityCodec::new(ShortSerializer);
        let err = codec.encode(&Rating::new(1)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let codec = EntityCodec::new(RatingSerializer);
        let err = codec.decode(0, &[0u8; 5]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
    }

    #[test]
    fn test_decode_node_rejects_deleted_node() {
        let codec = EntityCodec::new(RatingSerializer);
        let node = EntityNode::deleted(4, -1, codec.entity_size());
        let err = codec.decode_node(&node).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IndexCorrupted);
    }

    #[test]
    fn test_write_stats_only_touches_statistics() {
        let codec = EntityCodec::new(RatingSerializer);
        let mut bytes = codec.encode(&Rating::labelled(10, "Carlsen")).unwrap();
        codec.write_stats(&mut bytes, 99, 5);

        let decoded = codec.decode(0, &bytes).unwrap();
        assert_eq!(decoded.label, "Carlsen");
        assert_eq!(decoded.count, 99);
        assert_eq!(decoded.first_ref, 5);
    }
}
