use crate::common::{atomic, Atomic, IndexEventBus, ReadExecutor, SubscriberRef, WriteExecutor, MIN_HEADER_SIZE};
use crate::entity::{EntityNode, IndexHeader};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::store::file::FileStoreConfig;
use crate::store::{
    check_entity_size, check_node_id, check_node_size, check_range, closed_error,
    NodeStoreProvider, StoreConfig, StoreConfigProvider, StoreEventInfo, StoreEventListener,
    StoreEvents,
};
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Node store backed by a single file.
///
/// # File layout
/// The header comes first and records its own size. Node `id` lives in the
/// fixed-size slot starting at `header_size + id * (entity_byte_size + 9)`,
/// so every read and write seeks straight to its slot.
///
/// # Caching
/// Single node reads go through a write-through LRU cache of
/// [`FileStoreConfig::cache_size`] nodes. Ranged reads bypass the cache.
///
/// # Durability
/// [`NodeStoreProvider::commit`] syncs the file. A batch is not crash-atomic:
/// a failure in the middle of a batch may leave a torn tree behind.
#[derive(Clone)]
pub struct FileNodeStore {
    inner: Arc<FileNodeStoreInner>,
}

impl FileNodeStore {
    pub fn new(store_config: FileStoreConfig) -> FileNodeStore {
        FileNodeStore {
            inner: Arc::new(FileNodeStoreInner::new(store_config)),
        }
    }

    /// Reads the header and every node of an index file.
    pub fn read_index(file_path: &str) -> IndexResult<(IndexHeader, Vec<EntityNode>)> {
        let mut file = OpenOptions::new().read(true).open(file_path)?;
        let header = read_header(&mut file)?;
        check_file_length(&file, &header, file_path)?;

        let capacity = header.capacity();
        let nodes = read_slots(&mut file, &header, 0, capacity)?;
        log::debug!("Read {} nodes from {}", nodes.len(), file_path);
        Ok((header, nodes))
    }
}

impl NodeStoreProvider for FileNodeStore {
    fn open_or_create(&self, entity_byte_size: usize) -> IndexResult<IndexHeader> {
        self.inner.open_or_create(entity_byte_size)
    }

    fn is_closed(&self) -> IndexResult<bool> {
        Ok(self.inner.closed.load(Ordering::Relaxed))
    }

    fn is_read_only(&self) -> IndexResult<bool> {
        Ok(self.inner.store_config.is_read_only())
    }

    fn header(&self) -> IndexResult<IndexHeader> {
        self.inner.check_open()
    }

    fn get_node(&self, id: i32) -> IndexResult<EntityNode> {
        self.inner.get_node(id)
    }

    fn get_nodes(&self, start_id: i32, end_id: i32) -> IndexResult<Vec<EntityNode>> {
        self.inner.get_nodes(start_id, end_id)
    }

    fn put_node(&self, node: &EntityNode) -> IndexResult<()> {
        let header = self.inner.check_writable()?;
        self.inner.write_nodes(&header, &[node.clone()])
    }

    fn put_header(&self, header: &IndexHeader) -> IndexResult<()> {
        self.inner.check_writable()?;
        self.inner.write_header(header)
    }

    fn write_batch(&self, header: &IndexHeader, nodes: &[EntityNode]) -> IndexResult<()> {
        self.inner.check_writable()?;
        self.inner.write_nodes(header, nodes)?;
        self.inner.write_header(header)
    }

    fn commit(&self) -> IndexResult<()> {
        self.inner.commit()
    }

    fn close(&self) -> IndexResult<()> {
        self.inner.close()
    }

    fn subscribe(&self, listener: StoreEventListener) -> IndexResult<SubscriberRef> {
        self.inner.event_bus.register(listener)
    }

    fn unsubscribe(&self, subscriber_ref: SubscriberRef) -> IndexResult<()> {
        self.inner.event_bus.deregister(subscriber_ref)
    }

    fn store_version(&self) -> IndexResult<String> {
        Ok(format!("File/{}", env!("CARGO_PKG_VERSION")))
    }

    fn store_config(&self) -> IndexResult<StoreConfig> {
        Ok(StoreConfig::new(self.inner.store_config.clone()))
    }
}

struct FileNodeStoreInner {
    store_config: FileStoreConfig,
    file: Mutex<Option<File>>,
    header: Atomic<Option<IndexHeader>>,
    cache: Mutex<Option<LruCache<i32, EntityNode>>>,
    closed: AtomicBool,
    event_bus: IndexEventBus<StoreEventInfo, StoreEventListener>,
}

impl FileNodeStoreInner {
    fn new(store_config: FileStoreConfig) -> FileNodeStoreInner {
        FileNodeStoreInner {
            store_config,
            file: Mutex::new(None),
            header: atomic(None),
            cache: Mutex::new(None),
            closed: AtomicBool::new(false),
            event_bus: IndexEventBus::new(),
        }
    }

    fn open_or_create(&self, entity_byte_size: usize) -> IndexResult<IndexHeader> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(closed_error());
        }
        if let Some(header) = self.header.read_with(|header| header.clone()) {
            check_entity_size(&header, entity_byte_size)?;
            return Ok(header);
        }

        let file_path = self.store_config.file_path();
        if file_path.is_empty() {
            log::error!("File node store opened without a file path");
            return Err(IndexError::new(
                "A file path is required for a file node store",
                ErrorKind::InvalidArgument,
            ));
        }

        let read_only = self.store_config.is_read_only();
        let (file, header) = if Path::new(&file_path).exists() {
            let mut file = OpenOptions::new()
                .read(true)
                .write(!read_only)
                .open(&file_path)?;
            let header = read_header(&mut file)?;
            check_entity_size(&header, entity_byte_size)?;
            check_file_length(&file, &header, &file_path)?;
            log::debug!(
                "Opened index file {} with {} slots and {} live entities",
                file_path,
                header.capacity(),
                header.num_live_entities()
            );
            (file, header)
        } else {
            if read_only || !self.store_config.create_if_missing() {
                log::error!("Index file {} does not exist", file_path);
                return Err(IndexError::new(
                    &format!("Index file {} does not exist", file_path),
                    ErrorKind::FileNotFound,
                ));
            }

            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&file_path)?;
            let header = IndexHeader::new(entity_byte_size);
            file.write_all(&header.to_bytes())?;
            file.sync_all()?;
            log::debug!("Created index file {}", file_path);
            (file, header)
        };

        *self.file.lock() = Some(file);
        *self.cache.lock() = NonZeroUsize::new(self.store_config.cache_size()).map(LruCache::new);
        self.header.write_with(|slot| *slot = Some(header.clone()));

        for listener in self.store_config.event_listeners() {
            self.event_bus.register(listener)?;
        }
        self.alert(StoreEvents::Open);
        Ok(header)
    }

    fn check_open(&self) -> IndexResult<IndexHeader> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(closed_error());
        }

        self.header.read_with(|header| match header {
            Some(header) => Ok(header.clone()),
            None => Err(IndexError::new(
                "File node store has not been opened",
                ErrorKind::InvalidOperation,
            )),
        })
    }

    fn check_writable(&self) -> IndexResult<IndexHeader> {
        let header = self.check_open()?;
        if self.store_config.is_read_only() {
            log::error!(
                "Attempt to write to read-only index file {}",
                self.store_config.file_path()
            );
            return Err(IndexError::new(
                "Index file is opened read-only",
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(header)
    }

    fn with_file<R>(&self, f: impl FnOnce(&mut File) -> IndexResult<R>) -> IndexResult<R> {
        let mut guard = self.file.lock();
        match guard.as_mut() {
            Some(file) => f(file),
            None => Err(closed_error()),
        }
    }

    fn get_node(&self, id: i32) -> IndexResult<EntityNode> {
        let header = self.check_open()?;
        check_node_id(id, header.capacity())?;

        if let Some(cache) = self.cache.lock().as_mut() {
            if let Some(node) = cache.get(&id) {
                return Ok(node.clone());
            }
        }

        let node = self
            .with_file(|file| read_slots(file, &header, id, id + 1))?
            .pop()
            .ok_or_else(|| {
                IndexError::new(&format!("Node {} could not be read", id), ErrorKind::IOError)
            })?;

        if let Some(cache) = self.cache.lock().as_mut() {
            cache.put(id, node.clone());
        }
        Ok(node)
    }

    fn get_nodes(&self, start_id: i32, end_id: i32) -> IndexResult<Vec<EntityNode>> {
        let header = self.check_open()?;
        if start_id == end_id {
            return Ok(Vec::new());
        }
        check_range(start_id, end_id, header.capacity())?;
        self.with_file(|file| read_slots(file, &header, start_id, end_id))
    }

    /// Writes nodes in runs of consecutive ids, one write per run.
    fn write_nodes(&self, header: &IndexHeader, nodes: &[EntityNode]) -> IndexResult<()> {
        let mut sorted: Vec<&EntityNode> = Vec::with_capacity(nodes.len());
        for node in nodes {
            check_node_id(node.id(), header.capacity())?;
            check_node_size(node, header)?;
            sorted.push(node);
        }
        sorted.sort_by_key(|node| node.id());

        let slot_size = header.slot_size();
        self.with_file(|file| {
            let mut start = 0;
            while start < sorted.len() {
                let mut end = start + 1;
                while end < sorted.len() && sorted[end].id() == sorted[end - 1].id() + 1 {
                    end += 1;
                }

                let mut buf = vec![0u8; (end - start) * slot_size];
                for (i, node) in sorted[start..end].iter().enumerate() {
                    node.write_to(&mut buf[i * slot_size..(i + 1) * slot_size]);
                }
                file.seek(SeekFrom::Start(header.slot_offset(sorted[start].id())))?;
                file.write_all(&buf)?;
                start = end;
            }
            Ok(())
        })?;

        if let Some(cache) = self.cache.lock().as_mut() {
            for node in sorted {
                cache.put(node.id(), node.clone());
            }
        }
        Ok(())
    }

    fn write_header(&self, header: &IndexHeader) -> IndexResult<()> {
        self.with_file(|file| {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header.to_bytes())?;
            Ok(())
        })?;
        self.header.write_with(|slot| *slot = Some(header.clone()));
        Ok(())
    }

    fn commit(&self) -> IndexResult<()> {
        self.check_open()?;
        if !self.store_config.is_read_only() {
            self.with_file(|file| {
                file.sync_data()?;
                Ok(())
            })?;
        }
        self.alert(StoreEvents::Commit);
        Ok(())
    }

    fn close(&self) -> IndexResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(());
        }

        self.alert(StoreEvents::Closing);
        if let Some(file) = self.file.lock().take() {
            if !self.store_config.is_read_only() {
                file.sync_all()?;
            }
        }
        *self.cache.lock() = None;
        self.header.write_with(|header| *header = None);
        self.closed.store(true, Ordering::Relaxed);
        self.alert(StoreEvents::Closed);
        self.event_bus.close()?;
        log::debug!("Closed index file {}", self.store_config.file_path());
        Ok(())
    }

    /// Publishes `event`, logging listener failures instead of returning them.
    fn alert(&self, event: StoreEvents) {
        let file_path = self.store_config.file_path();
        if let Err(err) = self
            .event_bus
            .publish(StoreEventInfo::new(event.clone(), &file_path))
        {
            log::error!("Listener of {} failed on {:?}: {}", file_path, event, err);
        }
    }
}

fn read_header(file: &mut File) -> IndexResult<IndexHeader> {
    let mut prefix = [0u8; MIN_HEADER_SIZE];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut prefix)?;

    let header_size = IndexHeader::declared_size(&prefix)?;
    let mut buf = vec![0u8; header_size];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf)?;
    IndexHeader::from_bytes(&buf)
}

fn check_file_length(file: &File, header: &IndexHeader, file_path: &str) -> IndexResult<()> {
    let length = file.metadata()?.len();
    let expected = header.slot_offset(header.capacity());
    if length < expected {
        log::error!(
            "Index file {} is {} bytes, its header requires {}",
            file_path,
            length,
            expected
        );
        return Err(IndexError::new(
            &format!(
                "Index file is truncated: {} bytes of {} expected",
                length, expected
            ),
            ErrorKind::FileCorrupted,
        ));
    }
    if length > expected {
        log::warn!(
            "Index file {} has {} bytes beyond its last slot",
            file_path,
            length - expected
        );
    }
    Ok(())
}

fn read_slots(
    file: &mut File,
    header: &IndexHeader,
    start_id: i32,
    end_id: i32,
) -> IndexResult<Vec<EntityNode>> {
    let slot_size = header.slot_size();
    let count = (end_id - start_id) as usize;
    let mut buf = vec![0u8; count * slot_size];
    file.seek(SeekFrom::Start(header.slot_offset(start_id)))?;
    file.read_exact(&mut buf)?;

    buf.chunks_exact(slot_size)
        .zip(start_id..end_id)
        .map(|(slot, id)| EntityNode::from_bytes(id, slot, header.entity_byte_size()))
        .collect()
}
