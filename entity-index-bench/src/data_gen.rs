//! Data generators for benchmarks

use entity_index::entity::{Entity, EntitySerializer};
use entity_index::errors::{ErrorKind, IndexError, IndexResult};
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Ordering;

const NAME_SIZE: usize = 32;

/// Benchmark entity ordered by name.
#[derive(Debug, Clone)]
pub struct BenchPlayer {
    pub id: i32,
    pub name: String,
    pub rating: i32,
    pub games: i32,
    pub first_game_id: i32,
}

impl BenchPlayer {
    pub fn new(name: String, rating: i32) -> Self {
        BenchPlayer {
            id: -1,
            name,
            rating,
            games: 0,
            first_game_id: -1,
        }
    }
}

impl Entity for BenchPlayer {
    fn id(&self) -> i32 {
        self.id
    }

    fn with_id(&self, id: i32) -> Self {
        BenchPlayer {
            id,
            ..self.clone()
        }
    }

    fn usage_count(&self) -> i32 {
        self.games
    }

    fn first_reference_id(&self) -> i32 {
        self.first_game_id
    }

    fn compare_key(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

pub struct BenchPlayerSerializer;

impl EntitySerializer<BenchPlayer> for BenchPlayerSerializer {
    fn payload_size(&self) -> usize {
        NAME_SIZE + 4
    }

    fn serialize(&self, entity: &BenchPlayer) -> IndexResult<Vec<u8>> {
        let name = entity.name.as_bytes();
        if name.len() > NAME_SIZE {
            return Err(IndexError::new(
                &format!("Name {} is longer than {} bytes", entity.name, NAME_SIZE),
                ErrorKind::EncodingError,
            ));
        }
        let mut bytes = vec![0u8; NAME_SIZE + 4];
        bytes[..name.len()].copy_from_slice(name);
        bytes[NAME_SIZE..].copy_from_slice(&entity.rating.to_be_bytes());
        Ok(bytes)
    }

    fn deserialize(
        &self,
        id: i32,
        usage_count: i32,
        first_reference_id: i32,
        payload: &[u8],
    ) -> IndexResult<BenchPlayer> {
        let name = &payload[..NAME_SIZE];
        let end = name.iter().position(|b| *b == 0).unwrap_or(NAME_SIZE);
        let mut rating = [0u8; 4];
        rating.copy_from_slice(&payload[NAME_SIZE..NAME_SIZE + 4]);
        Ok(BenchPlayer {
            id,
            name: String::from_utf8_lossy(&name[..end]).to_string(),
            rating: i32::from_be_bytes(rating),
            games: usage_count,
            first_game_id: first_reference_id,
        })
    }
}

/// Generate players with unique names in random order
pub fn generate_players(count: usize) -> Vec<BenchPlayer> {
    let mut rng = rand::thread_rng();
    let mut players: Vec<BenchPlayer> = (0..count)
        .map(|i| BenchPlayer::new(format!("player_{:08}", i), rng.gen_range(1000..2900)))
        .collect();
    players.shuffle(&mut rng);
    players
}

/// Generate players whose names are ascending, the worst case for rotations
pub fn generate_sorted_players(count: usize) -> Vec<BenchPlayer> {
    (0..count)
        .map(|i| BenchPlayer::new(format!("player_{:08}", i), 1500))
        .collect()
}

/// Generate lookup keys drawn from the names of `count` generated players
pub fn generate_lookup_keys(count: usize, lookups: usize) -> Vec<BenchPlayer> {
    let mut rng = rand::thread_rng();
    (0..lookups)
        .map(|_| BenchPlayer::new(format!("player_{:08}", rng.gen_range(0..count)), 0))
        .collect()
}
