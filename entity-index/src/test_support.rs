//! Fixtures shared by the unit tests of this crate.

use crate::common::{read_i32, write_i32};
use crate::entity::{Entity, EntitySerializer};
use crate::errors::IndexResult;
use crate::index_builder::EntityIndexBuilder;
use crate::entity_index::EntityIndex;
use crate::store::memory::InMemoryStoreModule;
use std::cmp::Ordering;

// Setup only one time throughout the crate's unit tests.
#[ctor::ctor]
fn init() {
    colog::init();
}

/// Test entity keyed by an integer with a short fixed-width label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rating {
    pub id: i32,
    pub key: i32,
    pub label: String,
    pub count: i32,
    pub first_ref: i32,
}

impl Rating {
    pub fn new(key: i32) -> Self {
        Rating {
            id: -1,
            key,
            label: format!("r{}", key),
            count: 0,
            first_ref: -1,
        }
    }

    pub fn labelled(key: i32, label: &str) -> Self {
        Rating {
            label: label.to_string(),
            ..Rating::new(key)
        }
    }
}

impl Entity for Rating {
    fn id(&self) -> i32 {
        self.id
    }

    fn with_id(&self, id: i32) -> Self {
        Rating {
            id,
            ..self.clone()
        }
    }

    fn usage_count(&self) -> i32 {
        self.count
    }

    fn first_reference_id(&self) -> i32 {
        self.first_ref
    }

    fn compare_key(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

pub(crate) const LABEL_SIZE: usize = 12;

pub(crate) struct RatingSerializer;

impl EntitySerializer<Rating> for RatingSerializer {
    fn payload_size(&self) -> usize {
        4 + LABEL_SIZE
    }

    fn serialize(&self, entity: &Rating) -> IndexResult<Vec<u8>> {
        let mut bytes = vec![0u8; 4 + LABEL_SIZE];
        write_i32(&mut bytes, 0, entity.key);
        let label = entity.label.as_bytes();
        let len = label.len().min(LABEL_SIZE);
        bytes[4..4 + len].copy_from_slice(&label[..len]);
        Ok(bytes)
    }

    fn deserialize(
        &self,
        id: i32,
        usage_count: i32,
        first_reference_id: i32,
        payload: &[u8],
    ) -> IndexResult<Rating> {
        let label = &payload[4..];
        let end = label.iter().position(|b| *b == 0).unwrap_or(label.len());
        Ok(Rating {
            id,
            key: read_i32(payload, 0),
            label: String::from_utf8_lossy(&label[..end]).to_string(),
            count: usage_count,
            first_ref: first_reference_id,
        })
    }
}

/// Opens an empty in-memory index of ratings.
pub(crate) fn memory_index() -> EntityIndex<Rating> {
    EntityIndexBuilder::new(RatingSerializer)
        .load_module(InMemoryStoreModule::new())
        .open_or_create()
        .unwrap()
}

/// Collects the keys of the index in ascending key order.
pub(crate) fn keys_in_order(index: &EntityIndex<Rating>) -> Vec<i32> {
    index
        .iter_ascending()
        .unwrap()
        .map(|r| r.unwrap().key)
        .collect()
}
