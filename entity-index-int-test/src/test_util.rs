use entity_index::entity::{Entity, EntitySerializer};
use entity_index::entity_index::EntityIndex;
use entity_index::errors::{ErrorKind, IndexError, IndexResult};
use entity_index::store::file::FileStoreModule;
use entity_index::store::memory::InMemoryStoreModule;
use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;
use std::{env, fs, thread};

#[ctor::ctor]
fn init() {
    colog::init();
}

/// Runs `test` on the context produced by `before`, then always runs `after`.
///
/// The first error of the three steps fails the test.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    B: Fn() -> IndexResult<TestContext>,
    T: Fn(TestContext) -> IndexResult<()>,
    A: Fn(TestContext) -> IndexResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let test_result = test(ctx.clone());
    let after_result = after(ctx);
    if let Err(e) = test_result {
        panic!("Test failed: {:?}", e);
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

const NAME_SIZE: usize = 24;
const TITLE_SIZE: usize = 32;

fn write_text(buf: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(buf.len());
    buf[..len].copy_from_slice(&bytes[..len]);
}

fn read_text(buf: &[u8]) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).to_string()
}

fn payload_error(expected: usize, actual: usize) -> IndexError {
    IndexError::new(
        &format!("Expected {} payload bytes, got {}", expected, actual),
        ErrorKind::EncodingError,
    )
}

/// A player ordered by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: i32,
    pub name: String,
    pub elo: i32,
    pub games: i32,
    pub first_game_id: i32,
}

impl Player {
    pub fn new(name: &str) -> Self {
        Player::rated(name, 0)
    }

    pub fn rated(name: &str, elo: i32) -> Self {
        Player {
            id: -1,
            name: name.to_string(),
            elo,
            games: 0,
            first_game_id: -1,
        }
    }
}

impl Entity for Player {
    fn id(&self) -> i32 {
        self.id
    }

    fn with_id(&self, id: i32) -> Self {
        Player {
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

pub struct PlayerSerializer;

impl EntitySerializer<Player> for PlayerSerializer {
    fn payload_size(&self) -> usize {
        NAME_SIZE + 4
    }

    fn serialize(&self, entity: &Player) -> IndexResult<Vec<u8>> {
        let mut bytes = vec![0u8; NAME_SIZE + 4];
        write_text(&mut bytes[..NAME_SIZE], &entity.name);
        bytes[NAME_SIZE..].copy_from_slice(&entity.elo.to_be_bytes());
        Ok(bytes)
    }

    fn deserialize(
        &self,
        id: i32,
        usage_count: i32,
        first_reference_id: i32,
        payload: &[u8],
    ) -> IndexResult<Player> {
        if payload.len() != NAME_SIZE + 4 {
            return Err(payload_error(NAME_SIZE + 4, payload.len()));
        }
        let mut elo = [0u8; 4];
        elo.copy_from_slice(&payload[NAME_SIZE..]);
        Ok(Player {
            id,
            name: read_text(&payload[..NAME_SIZE]),
            elo: i32::from_be_bytes(elo),
            games: usage_count,
            first_game_id: first_reference_id,
        })
    }
}

/// A tournament ordered by year, then title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tournament {
    pub id: i32,
    pub year: i32,
    pub title: String,
    pub games: i32,
    pub first_game_id: i32,
}

impl Tournament {
    pub fn new(year: i32, title: &str) -> Self {
        Tournament {
            id: -1,
            year,
            title: title.to_string(),
            games: 0,
            first_game_id: -1,
        }
    }
}

impl Entity for Tournament {
    fn id(&self) -> i32 {
        self.id
    }

    fn with_id(&self, id: i32) -> Self {
        Tournament {
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
        self.year
            .cmp(&other.year)
            .then_with(|| self.title.cmp(&other.title))
    }
}

pub struct TournamentSerializer;

impl EntitySerializer<Tournament> for TournamentSerializer {
    fn payload_size(&self) -> usize {
        4 + TITLE_SIZE
    }

    fn serialize(&self, entity: &Tournament) -> IndexResult<Vec<u8>> {
        let mut bytes = vec![0u8; 4 + TITLE_SIZE];
        bytes[..4].copy_from_slice(&entity.year.to_be_bytes());
        write_text(&mut bytes[4..], &entity.title);
        Ok(bytes)
    }

    fn deserialize(
        &self,
        id: i32,
        usage_count: i32,
        first_reference_id: i32,
        payload: &[u8],
    ) -> IndexResult<Tournament> {
        if payload.len() != 4 + TITLE_SIZE {
            return Err(payload_error(4 + TITLE_SIZE, payload.len()));
        }
        let mut year = [0u8; 4];
        year.copy_from_slice(&payload[..4]);
        Ok(Tournament {
            id,
            year: i32::from_be_bytes(year),
            title: read_text(&payload[4..]),
            games: usage_count,
            first_game_id: first_reference_id,
        })
    }
}

/// A player index together with the file backing it, if any.
#[derive(Clone)]
pub struct TestContext {
    path: Option<String>,
    index: EntityIndex<Player>,
}

impl TestContext {
    pub fn new(path: Option<String>, index: EntityIndex<Player>) -> Self {
        Self { path, index }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn index(&self) -> EntityIndex<Player> {
        self.index.clone()
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir()
        .join(format!("{}.idx", id))
        .to_string_lossy()
        .to_string()
}

pub fn open_player_file(path: &str) -> IndexResult<EntityIndex<Player>> {
    EntityIndex::builder(PlayerSerializer)
        .load_module(FileStoreModule::with_config().file_path(path).build())
        .open_or_create()
}

pub fn create_test_context() -> IndexResult<TestContext> {
    let path = random_path();
    let index = open_player_file(&path)?;
    Ok(TestContext::new(Some(path), index))
}

pub fn create_memory_context() -> IndexResult<TestContext> {
    let index = EntityIndex::builder(PlayerSerializer)
        .load_module(InMemoryStoreModule::new())
        .open_or_create()?;
    Ok(TestContext::new(None, index))
}

pub fn cleanup(ctx: TestContext) -> IndexResult<()> {
    ctx.index().close()?;
    if let Some(path) = ctx.path() {
        remove_file(path);
    }
    Ok(())
}

/// Removes an index file, retrying briefly while the file is still held.
pub fn remove_file(path: &str) {
    for retry in 0..5u64 {
        if !Path::new(path).exists() {
            return;
        }
        match fs::remove_file(path) {
            Ok(_) => return,
            Err(e) => {
                log::warn!("Failed to remove {} (attempt {}): {}", path, retry + 1, e);
                thread::sleep(Duration::from_millis(20 * (retry + 1)));
            }
        }
    }
}

/// Adds every player in `names`, in order, within one transaction.
pub fn add_players(index: &EntityIndex<Player>, names: &[&str]) -> IndexResult<Vec<Player>> {
    let mut txn = index.begin_transaction()?;
    let mut added = Vec::with_capacity(names.len());
    for name in names {
        added.push(txn.add(&Player::new(name))?);
    }
    txn.commit()?;
    Ok(added)
}

pub fn names_in_order(index: &EntityIndex<Player>) -> IndexResult<Vec<String>> {
    index
        .iter_ascending()?
        .map(|player| player.map(|p| p.name))
        .collect()
}
