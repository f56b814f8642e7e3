//! General purpose, read-only interface for querying the repository.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    block_store::{BlockStore, BlockStoreError},
    types::{
        data_types::{ContentHash, EntityId, FileId, NodeId},
        hash_file::{self, HashFile, HashFileHeader, HashFileResolver, Lookup},
        lineage::{Child, Device, FileVersionReport, Snapshot},
    },
};

use super::super::pluggables::{KVGet, KVStore};

use super::internal::RepositoryError;

/// A factory for [`RepositoryView`]s.
///
/// Cameras are cheap to clone and can be moved to other threads. They never take the lock that
/// serializes mutations of the [`Repository`](super::internal::Repository).
#[derive(Clone)]
pub struct RepositoryCamera<K: KVStore>(K);

impl<K: KVStore> RepositoryCamera<K> {
    pub fn new(kv_store: K) -> Self {
        RepositoryCamera(kv_store)
    }

    pub fn view(&self) -> RepositoryView<K::View<'_>> {
        RepositoryView(self.0.view())
    }
}

/// A read-only view into the repository.
///
/// A view taken through a [`RepositoryCamera`] is guaranteed to stay unchanged while it is alive.
pub struct RepositoryView<S: KVGet>(pub(super) S);

impl<S: KVGet> RepositoryView<S> {
    pub(crate) fn new(kv_view: S) -> Self {
        RepositoryView(kv_view)
    }

    /* ↓↓↓ Identity ↓↓↓ */

    pub fn repository_id(&self) -> Result<EntityId, RepositoryError> {
        self.0.repository_id()?.ok_or(RepositoryError::NotInitialized)
    }

    pub fn owner_id(&self) -> Result<String, RepositoryError> {
        self.0.owner_id()?.ok_or(RepositoryError::NotInitialized)
    }

    /// Get the id of the local replica.
    pub fn node_id(&self) -> Result<NodeId, RepositoryError> {
        self.0.node_id()?.ok_or(RepositoryError::NotInitialized)
    }

    pub fn root_snapshot(&self) -> Result<Snapshot, RepositoryError> {
        let uuid = self
            .0
            .root_snapshot()?
            .ok_or(RepositoryError::NotInitialized)?;
        self.snapshot(&uuid)
    }

    /* ↓↓↓ Entities ↓↓↓ */

    /// Get the snapshot identified by `uuid`, even if it has been deleted.
    pub fn snapshot(&self, uuid: &EntityId) -> Result<Snapshot, RepositoryError> {
        self.0
            .snapshot(uuid)?
            .ok_or(RepositoryError::UnknownSnapshot { uuid: *uuid })
    }

    pub fn device(&self, uuid: &EntityId) -> Result<Device, RepositoryError> {
        self.0
            .device(uuid)?
            .ok_or(RepositoryError::UnknownDevice { uuid: *uuid })
    }

    pub fn contains_snapshot(&self, uuid: &EntityId) -> Result<bool, RepositoryError> {
        Ok(self.0.snapshot(uuid)?.is_some())
    }

    pub fn contains_device(&self, uuid: &EntityId) -> Result<bool, RepositoryError> {
        Ok(self.0.device(uuid)?.is_some())
    }

    /// Get every non-deleted snapshot.
    pub fn snapshots(&self) -> Result<Vec<Snapshot>, RepositoryError> {
        Ok(self
            .0
            .snapshots()?
            .into_iter()
            .filter(|snapshot| !snapshot.deleted)
            .collect())
    }

    /// Get every snapshot ever created, including deleted ones.
    pub fn all_snapshots(&self) -> Result<Vec<Snapshot>, RepositoryError> {
        Ok(self.0.snapshots()?)
    }

    pub fn devices(&self) -> Result<Vec<Device>, RepositoryError> {
        Ok(self.0.devices()?)
    }

    /// Get the non-deleted snapshots whose parent is `parent`.
    ///
    /// Computed by scanning every snapshot. Not cached.
    pub fn children_snapshots(&self, parent: &EntityId) -> Result<Vec<Snapshot>, RepositoryError> {
        Ok(self
            .snapshots()?
            .into_iter()
            .filter(|snapshot| snapshot.parent == Some(*parent))
            .collect())
    }

    /// Get the devices whose parent is `parent`.
    ///
    /// Computed by scanning every device. Not cached.
    pub fn children_devices(&self, parent: &EntityId) -> Result<Vec<Device>, RepositoryError> {
        Ok(self
            .devices()?
            .into_iter()
            .filter(|device| device.parent == *parent)
            .collect())
    }

    /// Get every child of `parent`, snapshots first.
    pub fn children(&self, parent: &EntityId) -> Result<Vec<Child>, RepositoryError> {
        let mut children: Vec<Child> = self
            .children_snapshots(parent)?
            .into_iter()
            .map(Child::Snapshot)
            .collect();
        children.extend(
            self.children_devices(parent)?
                .into_iter()
                .map(Child::Device),
        );
        Ok(children)
    }

    /* ↓↓↓ Hash Files ↓↓↓ */

    pub fn header(&self, file: &FileId) -> Result<HashFileHeader, RepositoryError> {
        self.0
            .hash_file_header(file)?
            .ok_or(RepositoryError::FileExpectedButNotFound { file: *file })
    }

    pub fn contains_file(&self, file: &FileId) -> Result<bool, RepositoryError> {
        Ok(self.0.file_parent(file)?.is_some())
    }

    /// Get the complete hash file `file`: header plus its own mapping.
    pub fn hash_file(&self, file: &FileId) -> Result<HashFile, RepositoryError> {
        let header = self.header(file)?;
        let entries = self.0.file_blocks(file)?;
        Ok(HashFile::from_parts(header, entries))
    }

    /// Get the hash that `file`'s own mapping holds for every mapped block.
    pub fn file_blocks(&self, file: &FileId) -> Result<BTreeMap<u64, ContentHash>, RepositoryError> {
        Ok(self.0.file_blocks(file)?)
    }

    /// Get the parent of `file` from the lineage index.
    pub fn file_parent(&self, file: &FileId) -> Result<FileId, RepositoryError> {
        self.0
            .file_parent(file)?
            .ok_or(RepositoryError::FileExpectedButNotFound { file: *file })
    }

    /// Get the chain of files from `file` up to and including the ROOT file.
    pub fn ancestry(&self, file: &FileId) -> Result<Vec<FileId>, RepositoryError> {
        let mut chain = vec![*file];
        let mut seen = BTreeSet::from([*file]);
        let mut cursor = *file;
        loop {
            let parent = self.file_parent(&cursor)?;
            if parent == cursor {
                return Ok(chain);
            }
            if !seen.insert(parent) {
                return Err(RepositoryError::IllegalState {
                    reason: "the lineage index contains a cycle",
                });
            }
            chain.push(parent);
            cursor = parent;
        }
    }

    /// Get the snapshot that currently wraps `file`, if any.
    pub fn file_snapshot(&self, file: &FileId) -> Result<Option<EntityId>, RepositoryError> {
        Ok(self.0.file_snapshot(file)?)
    }

    /// Get the ids of every hash file ever created in the repository.
    pub fn file_ids(&self) -> Result<Vec<FileId>, RepositoryError> {
        Ok(self.0.file_ids()?)
    }

    /// Look up the content hash of the block containing byte `offset` of `file`.
    ///
    /// See [`hash_file::lookup`] for the exact semantics of `recursive` and `extended`.
    pub fn read_hash(
        &self,
        file: &FileId,
        offset: u64,
        recursive: bool,
        extended: bool,
    ) -> Result<Option<Lookup>, RepositoryError> {
        let header = self.header(file)?;
        hash_file::lookup(self, &header, offset, recursive, extended)
    }

    /// Read the payload of the block containing byte `offset` of `file` from `store`.
    ///
    /// Returns `Ok(None)` if no file in `file`'s ancestry maps the block.
    pub fn read_block<B: BlockStore>(
        &self,
        file: &FileId,
        offset: u64,
        store: &B,
    ) -> Result<Option<Vec<u8>>, RepositoryError> {
        let hash = match self.read_hash(file, offset, true, false)? {
            Some(found) => found.into_hash(),
            None => return Ok(None),
        };
        let block_size = self.header(file)?.block_size as usize;
        match store.get(&hash, block_size) {
            Ok(data) => Ok(Some(data)),
            Err(BlockStoreError::BufferTooSmall { actual_len }) => {
                Ok(Some(store.get(&hash, actual_len)?))
            }
            Err(err) => Err(err.into()),
        }
    }

    /* ↓↓↓ Reconciliation ↓↓↓ */

    /// Get a version report for every hash file held by this replica.
    pub fn file_versions(&self) -> Result<Vec<FileVersionReport>, RepositoryError> {
        self.file_ids()?
            .iter()
            .map(|file| {
                let header = self.header(file)?;
                Ok(FileVersionReport {
                    file_id: header.file_id,
                    version: header.version,
                    writable: header.writable,
                    node_id: header.node_id,
                })
            })
            .collect()
    }

    /// Get the files this replica is the designated writer of: the current files of live devices that
    /// were created by this replica.
    pub fn designated_files(&self) -> Result<BTreeSet<FileId>, RepositoryError> {
        let node_id = self.node_id()?;
        let mut files = BTreeSet::new();
        for device in self.devices()? {
            if self.header(&device.file_id)?.node_id == node_id {
                files.insert(device.file_id);
            }
        }
        Ok(files)
    }
}

impl<S: KVGet> HashFileResolver for RepositoryView<S> {
    type Error = RepositoryError;

    fn header(&self, file: &FileId) -> Result<HashFileHeader, RepositoryError> {
        RepositoryView::header(self, file)
    }

    fn local_hash(
        &self,
        file: &FileId,
        block_index: u64,
    ) -> Result<Option<ContentHash>, RepositoryError> {
        Ok(self.0.file_block(file, block_index)?)
    }
}
