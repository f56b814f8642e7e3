//! Read-and-write handle through which every mutation of the repository happens.
//!
//! # Initializing the repository
//!
//! A repository starts out empty. Before anything else can be done with it, it must be initialized
//! with [`initialize`](Repository::initialize), which sets the following variables:
//!
//! |Variable|Initial value|
//! |---|---|
//! |Repository Id|Provided in [`RepositoryParameters`].|
//! |Owner Id|Provided in [`RepositoryParameters`].|
//! |Node Id|Provided to `initialize`.|
//! |Root Snapshot|A snapshot with the id provided in [`RepositoryParameters`], wrapping the ROOT file.|
//! |Hash Files|The ROOT file: size 0, sealed, its own parent.|
//!
//! # All-or-nothing updates
//!
//! Every top-level updater first reads and validates everything it needs through a
//! [`RepositoryView`], then collects all of its writes into a single [`RepositoryWriteBatch`], and
//! only then writes the batch. An updater that fails therefore leaves the store exactly as it found it.
//! Events are published only after the batch has been written.

use std::{collections::BTreeMap, fmt::Display, sync::mpsc::Sender, time::SystemTime};

use crate::{
    block_store::{BlockStore, BlockStoreError, TransactionId},
    events::{
        ChangedEvent, CreatedEvent, DeletedEvent, EntityRef, Event, Field, FieldValue,
        SealFileEvent,
    },
    types::{
        data_types::{ContentHash, EntityId, FileId, FileVersion, NodeId, Timestamp},
        hash_file::{HashFile, HashFileError, HashFileHeader},
        lineage::{Device, Snapshot},
    },
};

use super::super::{
    invariants,
    parameters::RepositoryParameters,
    pluggables::{KVGet, KVGetError, KVSetError, KVStore},
};

use super::{
    public::{RepositoryCamera, RepositoryView},
    write_batch::RepositoryWriteBatch,
};

/// Read and write handle into the repository.
///
/// ## Categories of methods
///
/// Methods are grouped into four categories, each in its own `impl` block:
/// 1. [Lifecycle methods](#impl-Repository<K>).
/// 2. [Top-level state updaters](#impl-Repository<K>-1).
/// 3. [Reconciliation updaters](#impl-Repository<K>-2).
/// 4. [State getters](#impl-Repository<K>-3).
pub struct Repository<K: KVStore> {
    kv_store: K,
    event_publisher: Option<Sender<Event>>,
    origin: Option<NodeId>,
}

/// Lifecycle methods.
impl<K: KVStore> Repository<K> {
    /// Create a new `Repository` on top of `kv_store`.
    ///
    /// If `kv_store` is empty, the repository has to be [initialized](Self::initialize) before use.
    pub fn new(kv_store: K) -> Self {
        Repository {
            kv_store,
            event_publisher: None,
            origin: None,
        }
    }

    /// Set the channel that events are published to after every successful update.
    pub(crate) fn set_event_publisher(&mut self, event_publisher: Option<Sender<Event>>) {
        self.event_publisher = event_publisher;
    }

    /// Initialize the repository variables listed in [initializing the
    /// repository](#initializing-the-repository), and return the root snapshot.
    ///
    /// Fails with [`IllegalState`](RepositoryError::IllegalState) if the repository is already
    /// initialized.
    pub fn initialize(
        &mut self,
        parameters: &RepositoryParameters,
        node_id: NodeId,
    ) -> Result<Snapshot, RepositoryError> {
        if self.is_initialized()? {
            return Err(RepositoryError::IllegalState {
                reason: "the repository is already initialized",
            });
        }
        invariants::check_geometry(
            parameters.block_size,
            parameters.cluster_size,
            parameters.hash_size,
        )?;

        let root_header = HashFileHeader::root(
            &parameters.repository,
            node_id,
            parameters.block_size,
            parameters.cluster_size,
            parameters.hash_size,
        );
        let root_snapshot = Snapshot {
            uuid: parameters.root_snapshot,
            name: String::from("root"),
            description: String::new(),
            file_id: root_header.file_id,
            parent: None,
            size: 0,
            deleted: false,
            root: true,
            created: Timestamp::now(),
            properties: BTreeMap::new(),
        };

        let mut wb = RepositoryWriteBatch::new();
        wb.set_repository_id(&parameters.repository)?;
        wb.set_owner_id(&parameters.owner)?;
        wb.set_node_id(&node_id)?;
        wb.set_root_snapshot(&root_snapshot.uuid)?;
        wb.set_hash_file_header(&root_header)?;
        wb.set_file_parent(&root_header.file_id, &root_header.file_id)?;
        wb.set_file_snapshot(&root_header.file_id, &root_snapshot.uuid)?;
        wb.set_snapshot(&root_snapshot)?;
        self.write(wb);

        self.publish_created(EntityRef::Snapshot(root_snapshot.uuid), root_snapshot.file_id);

        Ok(root_snapshot)
    }

    pub fn is_initialized(&self) -> Result<bool, RepositoryError> {
        Ok(self.view().0.repository_id()?.is_some())
    }

    /// Get a view that reads straight from the underlying store.
    pub fn view(&self) -> RepositoryView<&K> {
        RepositoryView::new(&self.kv_store)
    }

    /// Get a camera that other threads can take views with.
    pub fn camera(&self) -> RepositoryCamera<K> {
        RepositoryCamera::new(self.kv_store.clone())
    }

    /// Run `operations` on behalf of the node `origin`, and return their result.
    ///
    /// Every hash file created inside `operations` records `origin` as its creator, which makes `origin`
    /// the file's designated writer and its preferred reconciliation source. Replicas use this to
    /// replay an operation that another node initiated, so that all replicas agree on every file's
    /// creator. Outside of this method, files are created on behalf of the local node.
    pub fn on_behalf_of<T>(&mut self, origin: NodeId, operations: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.origin.replace(origin);
        let result = operations(self);
        self.origin = previous;
        result
    }

    /// Atomically write the changes in `write_batch` into the repository.
    pub fn write(&mut self, write_batch: RepositoryWriteBatch<K::WriteBatch>) {
        self.kv_store.write(write_batch.0)
    }
}

/// Top-level state updaters.
///
/// These are the methods that implement the operations on snapshots and devices. Every one of them is
/// all-or-nothing.
impl<K: KVStore> Repository<K> {
    /// Create a device of `size` bytes under the snapshot `parent`.
    ///
    /// The device's first file is forked off the snapshot's sealed file and resized to `size`.
    ///
    /// ## Errors
    ///
    /// Checks are made in this order:
    /// 1. `name` is empty: [`InvalidArgument`](RepositoryError::InvalidArgument).
    /// 2. `parent` does not exist: [`UnknownSnapshot`](RepositoryError::UnknownSnapshot).
    /// 3. `size` is zero or not a multiple of the block size: [`InvalidSize`](RepositoryError::InvalidSize).
    /// 4. `uuid` or the derived file id is taken: [`DuplicateId`](RepositoryError::DuplicateId).
    /// 5. `parent` is deleted: [`IllegalState`](RepositoryError::IllegalState).
    pub fn create_device(
        &mut self,
        parent: &EntityId,
        name: &str,
        description: &str,
        size: u64,
        uuid: EntityId,
    ) -> Result<Device, RepositoryError> {
        invariants::check_name(name)?;

        let view = self.view();
        let parent_snapshot = view.snapshot(parent)?;
        let parent_header = view.header(&parent_snapshot.file_id)?;
        invariants::check_size(size, parent_header.block_size)?;
        invariants::check_unused_entity(&view, &uuid)?;
        let file_id = FileId::derive(&uuid, &parent_header.file_id);
        invariants::check_unused_file(&view, &file_id)?;
        if parent_snapshot.deleted {
            return Err(RepositoryError::IllegalState {
                reason: "cannot create a device under a deleted snapshot",
            });
        }

        let mut header = parent_header.fork(file_id, uuid, self.creator()?);
        header.set_size(size);
        let device = Device {
            uuid,
            name: name.to_string(),
            description: description.to_string(),
            size,
            block_size: header.block_size,
            file_id,
            parent: *parent,
            created: Timestamp::now(),
        };

        let mut wb = RepositoryWriteBatch::new();
        wb.set_hash_file_header(&header)?;
        wb.set_file_parent(&file_id, &parent_header.file_id)?;
        wb.set_device(&device)?;
        self.write(wb);

        self.publish_created(EntityRef::Device(uuid), file_id);

        Ok(device)
    }

    /// Take a snapshot of `device`.
    ///
    /// Seals the device's current file, wraps it in a new snapshot whose parent is the device's previous
    /// parent, and gives the device a fresh writable file forked off the sealed one. The device's parent
    /// becomes the new snapshot. Fails with [`NotWritable`](RepositoryError::NotWritable) if the current
    /// file was already sealed by reconciliation.
    pub fn create_snapshot(
        &mut self,
        device: &EntityId,
        name: &str,
        description: &str,
        uuid: EntityId,
    ) -> Result<Snapshot, RepositoryError> {
        invariants::check_name(name)?;

        let view = self.view();
        let mut updated_device = view.device(device)?;
        invariants::check_unused_entity(&view, &uuid)?;
        let mut sealed = view.header(&updated_device.file_id)?;
        sealed.check_writable()?;
        sealed.seal();
        let next_id = FileId::derive(device, &sealed.file_id);
        invariants::check_unused_file(&view, &next_id)?;
        let next = sealed.fork(next_id, *device, self.creator()?);

        let snapshot = Snapshot {
            uuid,
            name: name.to_string(),
            description: description.to_string(),
            file_id: sealed.file_id,
            parent: Some(updated_device.parent),
            size: updated_device.size,
            deleted: false,
            root: false,
            created: Timestamp::now(),
            properties: BTreeMap::new(),
        };
        let old_parent = updated_device.parent;
        updated_device.file_id = next_id;
        updated_device.parent = uuid;

        let mut wb = RepositoryWriteBatch::new();
        wb.set_hash_file_header(&sealed)?;
        wb.set_hash_file_header(&next)?;
        wb.set_file_parent(&next_id, &sealed.file_id)?;
        wb.set_file_snapshot(&sealed.file_id, &uuid)?;
        wb.set_snapshot(&snapshot)?;
        wb.set_device(&updated_device)?;
        self.write(wb);

        self.publish_seal_file(&sealed);
        self.publish_created(EntityRef::Snapshot(uuid), sealed.file_id);
        self.publish_changed(
            EntityRef::Device(*device),
            Field::FileId,
            FieldValue::FileId(sealed.file_id),
            FieldValue::FileId(next_id),
        );
        self.publish_changed(
            EntityRef::Device(*device),
            Field::Parent,
            FieldValue::Parent(old_parent),
            FieldValue::Parent(uuid),
        );

        Ok(snapshot)
    }

    /// Clone `device` into a new device `uuid`.
    ///
    /// Seals the device's current file and forks it twice: once to continue the original device, and
    /// once to start the clone. The clone hangs under the same snapshot as the original.
    pub fn clone_device(
        &mut self,
        device: &EntityId,
        name: &str,
        description: &str,
        uuid: EntityId,
    ) -> Result<Device, RepositoryError> {
        invariants::check_name(name)?;

        let view = self.view();
        let mut original = view.device(device)?;
        invariants::check_unused_entity(&view, &uuid)?;
        let node_id = self.creator()?;
        let mut sealed = view.header(&original.file_id)?;
        sealed.seal();
        let continuation_id = FileId::derive(device, &sealed.file_id);
        let clone_id = FileId::derive(&uuid, &sealed.file_id);
        invariants::check_unused_file(&view, &continuation_id)?;
        invariants::check_unused_file(&view, &clone_id)?;
        let continuation = sealed.fork(continuation_id, *device, node_id);
        let clone_header = sealed.fork(clone_id, uuid, node_id);

        let clone = Device {
            uuid,
            name: name.to_string(),
            description: description.to_string(),
            size: original.size,
            block_size: original.block_size,
            file_id: clone_id,
            parent: original.parent,
            created: Timestamp::now(),
        };
        original.file_id = continuation_id;

        let mut wb = RepositoryWriteBatch::new();
        wb.set_hash_file_header(&sealed)?;
        wb.set_hash_file_header(&continuation)?;
        wb.set_file_parent(&continuation_id, &sealed.file_id)?;
        wb.set_hash_file_header(&clone_header)?;
        wb.set_file_parent(&clone_id, &sealed.file_id)?;
        wb.set_device(&original)?;
        wb.set_device(&clone)?;
        self.write(wb);

        self.publish_seal_file(&sealed);
        self.publish_changed(
            EntityRef::Device(*device),
            Field::FileId,
            FieldValue::FileId(sealed.file_id),
            FieldValue::FileId(continuation_id),
        );
        self.publish_created(EntityRef::Device(uuid), clone_id);

        Ok(clone)
    }

    /// Change the size of `device` to `new_size` bytes, and return the updated device.
    ///
    /// The device's current file is resized in place, unless
    /// [`resize_needs_new_file`](invariants::resize_needs_new_file), in which case it is sealed and the
    /// device continues in a fresh fork of it. Either way, the block size never changes, and offsets
    /// beyond the smallest size the device ever had since its last fork are never resolved through
    /// ancestors again.
    pub fn resize_device(
        &mut self,
        device: &EntityId,
        new_size: u64,
    ) -> Result<Device, RepositoryError> {
        let view = self.view();
        let mut updated = view.device(device)?;
        let mut header = view.header(&updated.file_id)?;
        invariants::check_size(new_size, header.block_size)?;
        if new_size == updated.size {
            return Ok(updated);
        }
        header.check_writable()?;

        let old_size = updated.size;
        let old_file = updated.file_id;
        let entries = view.file_blocks(&old_file)?;
        let mut wb = RepositoryWriteBatch::new();
        let mut sealed = None;

        if invariants::resize_needs_new_file(&header, &entries, new_size) {
            header.seal();
            let next_id = FileId::derive(device, &header.file_id);
            invariants::check_unused_file(&view, &next_id)?;
            let mut next = header.fork(next_id, *device, self.creator()?);
            next.set_size(new_size);
            wb.set_hash_file_header(&header)?;
            wb.set_hash_file_header(&next)?;
            wb.set_file_parent(&next_id, &header.file_id)?;
            updated.file_id = next_id;
            sealed = Some(header);
        } else {
            header.set_size(new_size);
            header.bump_version();
            wb.set_hash_file_header(&header)?;
        }
        updated.size = new_size;
        wb.set_device(&updated)?;
        self.write(wb);

        if let Some(sealed) = sealed {
            self.publish_seal_file(&sealed);
            self.publish_changed(
                EntityRef::Device(*device),
                Field::FileId,
                FieldValue::FileId(old_file),
                FieldValue::FileId(updated.file_id),
            );
        }
        self.publish_changed(
            EntityRef::Device(*device),
            Field::Size,
            FieldValue::Size(old_size),
            FieldValue::Size(new_size),
        );

        Ok(updated)
    }

    /// Mark `snapshot` as deleted.
    ///
    /// The snapshot's file stays in the lineage index, so descendants keep resolving through it.
    /// Deleting an already deleted snapshot is a no-op. Deleting the root snapshot fails with
    /// [`IllegalState`](RepositoryError::IllegalState).
    pub fn delete_snapshot(&mut self, snapshot: &EntityId) -> Result<(), RepositoryError> {
        let mut updated = self.view().snapshot(snapshot)?;
        if !invariants::snapshot_deletable(&updated)? {
            return Ok(());
        }
        updated.deleted = true;

        let mut wb = RepositoryWriteBatch::new();
        wb.set_snapshot(&updated)?;
        wb.delete_file_snapshot(&updated.file_id);
        self.write(wb);

        Event::publish(
            &self.event_publisher,
            Event::Deleted(DeletedEvent {
                timestamp: SystemTime::now(),
                entity: EntityRef::Snapshot(*snapshot),
            }),
        );

        Ok(())
    }

    /// Delete `device`. Its current file is sealed and stays in the lineage index.
    pub fn delete_device(&mut self, device: &EntityId) -> Result<(), RepositoryError> {
        let view = self.view();
        let removed = view.device(device)?;
        let mut header = view.header(&removed.file_id)?;
        let was_writable = header.seal();

        let mut wb = RepositoryWriteBatch::new();
        wb.set_hash_file_header(&header)?;
        wb.delete_device(device);
        self.write(wb);

        if was_writable {
            self.publish_seal_file(&header);
        }
        Event::publish(
            &self.event_publisher,
            Event::Deleted(DeletedEvent {
                timestamp: SystemTime::now(),
                entity: EntityRef::Device(*device),
            }),
        );

        Ok(())
    }

    /// Store `hash` as the content hash of the block containing byte `offset` of `device`.
    pub fn write_hash(
        &mut self,
        device: &EntityId,
        offset: u64,
        hash: ContentHash,
    ) -> Result<(), RepositoryError> {
        let view = self.view();
        let current = view.device(device)?;
        let mut header = view.header(&current.file_id)?;
        header.check_writable()?;
        let block_index = header.block_index(offset)?;
        header.check_hash(&hash)?;

        self.record_hash(&mut header, block_index, &hash)
    }

    /// Store `data` as the payload of the block containing byte `offset` of `device`.
    ///
    /// The payload is hashed with [`ContentHash::digest`], stored in `store`, and the hash is recorded
    /// in the device's current file. The payload is always stored with [`put`](BlockStore::put): a hash
    /// this write unmaps may still be mapped by other blocks, ancestors, or other devices, so evicting
    /// it is left to the store. Returns the payload's hash.
    pub fn write_block<B: BlockStore>(
        &mut self,
        device: &EntityId,
        offset: u64,
        data: &[u8],
        store: &mut B,
        tx: Option<TransactionId>,
    ) -> Result<ContentHash, RepositoryError> {
        let view = self.view();
        let current = view.device(device)?;
        let mut header = view.header(&current.file_id)?;
        header.check_writable()?;
        let block_index = header.block_index(offset)?;
        let hash = ContentHash::digest(data, header.hash_size);
        store.put(&hash, Some(data), tx)?;

        self.record_hash(&mut header, block_index, &hash)?;
        Ok(hash)
    }

    /// Seal `file`. Returns whether the file was writable before the call.
    ///
    /// The current file of a live device can only be sealed through
    /// [`create_snapshot`](Self::create_snapshot), [`clone_device`](Self::clone_device),
    /// [`resize_device`](Self::resize_device), or [`delete_device`](Self::delete_device). Trying to seal
    /// one here fails with [`IllegalState`](RepositoryError::IllegalState).
    pub fn seal_file(&mut self, file: &FileId) -> Result<bool, RepositoryError> {
        let view = self.view();
        if view.devices()?.iter().any(|device| device.file_id == *file) {
            return Err(RepositoryError::IllegalState {
                reason: "the current file of a live device cannot be sealed directly",
            });
        }
        let header = view.header(file)?;
        self.seal_header(header)
    }

    /// Set the user property `key` of `snapshot` to `value`.
    pub fn set_snapshot_property(
        &mut self,
        snapshot: &EntityId,
        key: &str,
        value: &str,
    ) -> Result<(), RepositoryError> {
        let mut updated = self.view().snapshot(snapshot)?;
        if updated.deleted {
            return Err(RepositoryError::IllegalState {
                reason: "cannot set a property of a deleted snapshot",
            });
        }
        let old = updated
            .properties
            .insert(key.to_string(), value.to_string());

        let mut wb = RepositoryWriteBatch::new();
        wb.set_snapshot(&updated)?;
        self.write(wb);

        self.publish_changed(
            EntityRef::Snapshot(*snapshot),
            Field::Property(key.to_string()),
            FieldValue::Property(old),
            FieldValue::Property(Some(value.to_string())),
        );

        Ok(())
    }

    fn record_hash(
        &mut self,
        header: &mut HashFileHeader,
        block_index: u64,
        hash: &ContentHash,
    ) -> Result<(), RepositoryError> {
        header.bump_version();
        let mut wb = RepositoryWriteBatch::new();
        wb.set_file_block(&header.file_id, block_index, hash)?;
        wb.set_hash_file_header(header)?;
        self.write(wb);
        Ok(())
    }

    fn seal_header(&mut self, mut header: HashFileHeader) -> Result<bool, RepositoryError> {
        if !header.seal() {
            return Ok(false);
        }
        let mut wb = RepositoryWriteBatch::new();
        wb.set_hash_file_header(&header)?;
        self.write(wb);
        self.publish_seal_file(&header);
        Ok(true)
    }
}

/// Reconciliation updaters.
///
/// These are called by the [reconciliation driver](crate::reconciliation::client) only.
impl<K: KVStore> Repository<K> {
    /// Replace the mapping of the local copy of `fetched`'s file with `fetched`'s mapping, and take over
    /// its version, size, and ancestry limit.
    ///
    /// The local copy keeps its own writability and creator: reconciliation never hands out write
    /// access. Returns the local version before the update, or `None` if `fetched` is not strictly newer
    /// than the local copy, in which case nothing is written.
    pub fn apply_reconciled_file(
        &mut self,
        fetched: HashFile,
    ) -> Result<Option<FileVersion>, RepositoryError> {
        let view = self.view();
        let (fetched_header, fetched_entries) = fetched.into_parts();
        let mut header = view.header(&fetched_header.file_id)?;
        if fetched_header.version <= header.version {
            return Ok(None);
        }
        for hash in fetched_entries.values() {
            header.check_hash(hash)?;
        }
        let local_entries = view.file_blocks(&header.file_id)?;

        let old_version = header.version;
        header.version = fetched_header.version;
        header.size = fetched_header.size;
        header.ancestry_limit = fetched_header.ancestry_limit;
        header.flags = fetched_header.flags;

        let mut wb = RepositoryWriteBatch::new();
        for block_index in local_entries.keys() {
            if !fetched_entries.contains_key(block_index) {
                wb.delete_file_block(&header.file_id, *block_index);
            }
        }
        for (block_index, hash) in &fetched_entries {
            if local_entries.get(block_index) != Some(hash) {
                wb.set_file_block(&header.file_id, *block_index, hash)?;
            }
        }
        wb.set_hash_file_header(&header)?;
        self.write(wb);

        Ok(Some(old_version))
    }

    /// Seal a writable file that every online peer already holds sealed and that no local device writes
    /// to. Returns whether the file was writable before the call.
    ///
    /// Unlike [`seal_file`](Self::seal_file), this does not refuse device heads: a device head that is
    /// sealed everywhere else was abandoned by an operation this replica has not observed.
    pub fn seal_abandoned_file(&mut self, file: &FileId) -> Result<bool, RepositoryError> {
        let header = self.view().header(file)?;
        self.seal_header(header)
    }
}

/// State getters.
impl<K: KVStore> Repository<K> {
    pub fn node_id(&self) -> Result<NodeId, RepositoryError> {
        self.view().node_id()
    }

    pub fn snapshot(&self, uuid: &EntityId) -> Result<Snapshot, RepositoryError> {
        self.view().snapshot(uuid)
    }

    pub fn device(&self, uuid: &EntityId) -> Result<Device, RepositoryError> {
        self.view().device(uuid)
    }

    pub fn root_snapshot(&self) -> Result<Snapshot, RepositoryError> {
        self.view().root_snapshot()
    }

    /// The node that files created right now are created on behalf of.
    fn creator(&self) -> Result<NodeId, RepositoryError> {
        match self.origin {
            Some(origin) => Ok(origin),
            None => self.view().node_id(),
        }
    }

    fn publish_created(&self, entity: EntityRef, file: FileId) {
        Event::publish(
            &self.event_publisher,
            Event::Created(CreatedEvent {
                timestamp: SystemTime::now(),
                entity,
                file,
            }),
        )
    }

    fn publish_changed(&self, entity: EntityRef, field: Field, old: FieldValue, new: FieldValue) {
        Event::publish(
            &self.event_publisher,
            Event::Changed(ChangedEvent {
                timestamp: SystemTime::now(),
                entity,
                field,
                old,
                new,
            }),
        )
    }

    fn publish_seal_file(&self, header: &HashFileHeader) {
        Event::publish(
            &self.event_publisher,
            Event::SealFile(SealFileEvent {
                timestamp: SystemTime::now(),
                file: header.file_id,
                version: header.version,
            }),
        )
    }
}

/// Either kind of id a [`DuplicateId`](RepositoryError::DuplicateId) error can be about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineageId {
    Entity(EntityId),
    File(FileId),
}

impl Display for LineageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineageId::Entity(uuid) => write!(f, "entity {}", uuid),
            LineageId::File(file) => write!(f, "file {}", file),
        }
    }
}

/// Error when reading or updating the repository.
#[derive(Debug)]
pub enum RepositoryError {
    /// A user-supplied argument is malformed, e.g., an empty name.
    InvalidArgument { reason: &'static str },

    /// A device size is zero or not a multiple of the block size.
    InvalidSize { size: u64, block_size: u32 },

    /// A snapshot, device, or file id is already taken.
    DuplicateId { id: LineageId },

    /// A write was attempted on a sealed file.
    NotWritable { file: FileId },

    /// An offset at or beyond a file's size was accessed.
    OutOfRange { file: FileId, offset: u64, size: u64 },

    IllegalState { reason: &'static str },

    /// A peer reported a file that this replica's lineage index does not contain.
    MissingFileInLineage { file: FileId, reported_by: NodeId },

    UnknownSnapshot { uuid: EntityId },

    UnknownDevice { uuid: EntityId },

    /// Unable to find a file, even though an invariant that the repository expects to be maintained
    /// suggests that the file should exist.
    FileExpectedButNotFound { file: FileId },

    /// The repository has not been [initialized](Repository::initialize).
    NotInitialized,

    /// Error when trying to get a value from the underlying key value store.
    KVGetError(KVGetError),

    /// Error when trying to set a value into the underlying key value store.
    KVSetError(KVSetError),

    /// Error returned by the block store, propagated unchanged.
    BlockStoreError(BlockStoreError),
}

impl Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::InvalidArgument { reason } => write!(f, "Invalid argument: {}", reason),
            RepositoryError::InvalidSize { size, block_size } => write!(
                f,
                "Invalid size {}: must be a positive multiple of the block size {}",
                size, block_size
            ),
            RepositoryError::DuplicateId { id } => write!(f, "Id of {} is already taken", id),
            RepositoryError::NotWritable { file } => write!(f, "File {} is sealed", file),
            RepositoryError::OutOfRange { file, offset, size } => write!(
                f,
                "Offset {} is out of range for file {} of size {}",
                offset, file, size
            ),
            RepositoryError::IllegalState { reason } => write!(f, "Illegal state: {}", reason),
            RepositoryError::MissingFileInLineage { file, reported_by } => write!(
                f,
                "File {} reported by node {} is missing from the lineage index",
                file, reported_by
            ),
            RepositoryError::UnknownSnapshot { uuid } => write!(f, "Unknown snapshot {}", uuid),
            RepositoryError::UnknownDevice { uuid } => write!(f, "Unknown device {}", uuid),
            RepositoryError::FileExpectedButNotFound { file } => {
                write!(f, "Expected file {} but found nothing", file)
            }
            RepositoryError::NotInitialized => write!(f, "The repository is not initialized"),
            RepositoryError::KVGetError(err) => Display::fmt(err, f),
            RepositoryError::KVSetError(err) => Display::fmt(err, f),
            RepositoryError::BlockStoreError(err) => Display::fmt(err, f),
        }
    }
}

impl std::error::Error for RepositoryError {}

impl From<KVGetError> for RepositoryError {
    fn from(value: KVGetError) -> Self {
        RepositoryError::KVGetError(value)
    }
}

impl From<KVSetError> for RepositoryError {
    fn from(value: KVSetError) -> Self {
        RepositoryError::KVSetError(value)
    }
}

impl From<BlockStoreError> for RepositoryError {
    fn from(value: BlockStoreError) -> Self {
        RepositoryError::BlockStoreError(value)
    }
}

impl From<HashFileError> for RepositoryError {
    fn from(value: HashFileError) -> Self {
        match value {
            HashFileError::NotWritable { file } => RepositoryError::NotWritable { file },
            HashFileError::OutOfRange { file, offset, size } => {
                RepositoryError::OutOfRange { file, offset, size }
            }
            HashFileError::InvalidArgument { reason } => {
                RepositoryError::InvalidArgument { reason }
            }
            HashFileError::UnknownFile { file } => {
                RepositoryError::FileExpectedButNotFound { file }
            }
        }
    }
}
