/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Business entities of the copy-on-write hierarchy: [`Snapshot`]s and [`Device`]s.
//!
//! Both kinds of entity are plain records. They do not hold references to each other or to their hash
//! files: every link (a device's parent snapshot, a snapshot's hash file, a file's parent file) is
//! stored as an id and resolved through the [repository](crate::repository), which is the sole owner
//! of the entities it returns.
//!
//! The methods on `Snapshot` and `Device` that change the hierarchy take the
//! [`Repository`](crate::repository::accessors::internal::Repository) explicitly and delegate to it;
//! the ones that only read take a [`RepositoryView`](crate::repository::accessors::public::RepositoryView).

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    data_types::{ContentHash, EntityId, FileId, FileVersion, NodeId, Timestamp},
    hash_file::Lookup,
};
use crate::repository::{
    accessors::{
        internal::{Repository, RepositoryError},
        public::RepositoryView,
    },
    pluggables::{KVGet, KVStore},
};

/// A named, frozen point in a device's history. Owns exactly one sealed hash file.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Snapshot {
    pub uuid: EntityId,
    pub name: String,
    pub description: String,
    /// The sealed hash file this snapshot wraps. Never changes after creation.
    pub file_id: FileId,
    /// The snapshot this snapshot was taken under. `None` only for the repository root.
    pub parent: Option<EntityId>,
    /// Logical byte length of the device at the moment the snapshot was taken.
    pub size: u64,
    pub deleted: bool,
    /// True only for the single repository root.
    pub root: bool,
    pub created: Timestamp,
    pub properties: BTreeMap<String, String>,
}

impl Snapshot {
    /// Create a device under this snapshot. See
    /// [`Repository::create_device`](crate::repository::accessors::internal::Repository::create_device).
    pub fn create_device<K: KVStore>(
        &self,
        repository: &mut Repository<K>,
        name: &str,
        description: &str,
        size: u64,
        uuid: EntityId,
    ) -> Result<Device, RepositoryError> {
        repository.create_device(&self.uuid, name, description, size, uuid)
    }

    /// Delete this snapshot. Deleting an already deleted snapshot is a no-op.
    pub fn delete<K: KVStore>(&mut self, repository: &mut Repository<K>) -> Result<(), RepositoryError> {
        repository.delete_snapshot(&self.uuid)?;
        self.deleted = true;
        Ok(())
    }

    /// Look up a content hash in this snapshot's hash file.
    pub fn read<S: KVGet>(
        &self,
        view: &RepositoryView<S>,
        offset: u64,
        recursive: bool,
        extended: bool,
    ) -> Result<Option<Lookup>, RepositoryError> {
        view.read_hash(&self.file_id, offset, recursive, extended)
    }

    /// Get the non-deleted snapshots whose parent is this snapshot.
    pub fn children_snapshots<S: KVGet>(
        &self,
        view: &RepositoryView<S>,
    ) -> Result<Vec<Snapshot>, RepositoryError> {
        view.children_snapshots(&self.uuid)
    }

    /// Get the devices whose parent is this snapshot.
    pub fn children_devices<S: KVGet>(
        &self,
        view: &RepositoryView<S>,
    ) -> Result<Vec<Device>, RepositoryError> {
        view.children_devices(&self.uuid)
    }
}

/// The mutable head of a branch. Owns exactly one hash file, which is writable.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Device {
    pub uuid: EntityId,
    pub name: String,
    pub description: String,
    pub size: u64,
    /// Never changed by resizing.
    pub block_size: u32,
    /// The device's current, writable hash file.
    pub file_id: FileId,
    /// The snapshot this device was last branched from.
    pub parent: EntityId,
    pub created: Timestamp,
}

impl Device {
    /// Store `hash` at `offset` in this device's current hash file.
    pub fn write<K: KVStore>(
        &self,
        repository: &mut Repository<K>,
        offset: u64,
        hash: ContentHash,
    ) -> Result<(), RepositoryError> {
        repository.write_hash(&self.uuid, offset, hash)
    }

    /// Look up a content hash in this device's current hash file.
    pub fn read<S: KVGet>(
        &self,
        view: &RepositoryView<S>,
        offset: u64,
        recursive: bool,
        extended: bool,
    ) -> Result<Option<Lookup>, RepositoryError> {
        view.read_hash(&self.file_id, offset, recursive, extended)
    }

    /// Resize this device. On success, `self` is refreshed from the repository.
    pub fn resize<K: KVStore>(
        &mut self,
        repository: &mut Repository<K>,
        new_size: u64,
    ) -> Result<(), RepositoryError> {
        *self = repository.resize_device(&self.uuid, new_size)?;
        Ok(())
    }

    /// Take a snapshot of this device. On success, `self` is refreshed from the repository: it has a new
    /// current file, and its parent is the new snapshot.
    pub fn create_snapshot<K: KVStore>(
        &mut self,
        repository: &mut Repository<K>,
        name: &str,
        description: &str,
        uuid: EntityId,
    ) -> Result<Snapshot, RepositoryError> {
        let snapshot = repository.create_snapshot(&self.uuid, name, description, uuid)?;
        *self = repository.device(&self.uuid)?;
        Ok(snapshot)
    }

    /// Clone this device. On success, `self` is refreshed from the repository: it has a new current
    /// file that shares its ancestor with the clone's.
    pub fn clone_device<K: KVStore>(
        &mut self,
        repository: &mut Repository<K>,
        name: &str,
        description: &str,
        uuid: EntityId,
    ) -> Result<Device, RepositoryError> {
        let clone = repository.clone_device(&self.uuid, name, description, uuid)?;
        *self = repository.device(&self.uuid)?;
        Ok(clone)
    }
}

/// Common view over the two kinds of node in the lineage tree.
pub trait LineageNode {
    fn uuid(&self) -> EntityId;

    /// The hash file this node currently owns.
    fn file_id(&self) -> FileId;

    /// The snapshot this node hangs under, if any.
    fn parent(&self) -> Option<EntityId>;

    fn size(&self) -> u64;
}

impl LineageNode for Snapshot {
    fn uuid(&self) -> EntityId {
        self.uuid
    }

    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl LineageNode for Device {
    fn uuid(&self) -> EntityId {
        self.uuid
    }

    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn parent(&self) -> Option<EntityId> {
        Some(self.parent)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// A child of a snapshot in the lineage tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Child {
    Snapshot(Snapshot),
    Device(Device),
}

impl LineageNode for Child {
    fn uuid(&self) -> EntityId {
        match self {
            Child::Snapshot(snapshot) => snapshot.uuid(),
            Child::Device(device) => device.uuid(),
        }
    }

    fn file_id(&self) -> FileId {
        match self {
            Child::Snapshot(snapshot) => snapshot.file_id(),
            Child::Device(device) => device.file_id(),
        }
    }

    fn parent(&self) -> Option<EntityId> {
        match self {
            Child::Snapshot(snapshot) => LineageNode::parent(snapshot),
            Child::Device(device) => LineageNode::parent(device),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Child::Snapshot(snapshot) => LineageNode::size(snapshot),
            Child::Device(device) => LineageNode::size(device),
        }
    }
}

/// One entry of a replica's answer to "list your file versions".
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct FileVersionReport {
    pub file_id: FileId,
    pub version: FileVersion,
    pub writable: bool,
    /// The node that created the file (from the file's header), not the node that reports it.
    pub node_id: NodeId,
}
