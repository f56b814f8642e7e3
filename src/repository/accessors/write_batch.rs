//! Typed write batch that forms the key of every repository variable.
//!
//! Repository code never calls [`WriteBatch::set`] directly. Instead it goes through
//! [`RepositoryWriteBatch`], whose setters serialize values with Borsh and store them at the keys
//! described in [`variables`](super::super::variables).

use borsh::BorshSerialize;

use crate::types::{
    data_types::{ContentHash, EntityId, FileId, NodeId},
    hash_file::HashFileHeader,
    lineage::{Device, Snapshot},
};

use super::super::{
    pluggables::{KVSetError, Key, WriteBatch},
    variables::{self, concat},
};

use super::internal::RepositoryError;

pub struct RepositoryWriteBatch<W: WriteBatch>(pub(crate) W);

impl<W: WriteBatch> RepositoryWriteBatch<W> {
    pub(crate) fn new() -> RepositoryWriteBatch<W> {
        RepositoryWriteBatch(W::new())
    }

    /* ↓↓↓ Identity ↓↓↓ */

    pub fn set_repository_id(&mut self, uuid: &EntityId) -> Result<(), RepositoryError> {
        self.set_value(&variables::REPOSITORY_ID, uuid, Key::RepositoryId)
    }

    pub fn set_owner_id(&mut self, owner: &str) -> Result<(), RepositoryError> {
        self.set_value(&variables::OWNER_ID, &owner.to_string(), Key::OwnerId)
    }

    pub fn set_node_id(&mut self, node_id: &NodeId) -> Result<(), RepositoryError> {
        self.set_value(&variables::NODE_ID, node_id, Key::NodeId)
    }

    pub fn set_root_snapshot(&mut self, uuid: &EntityId) -> Result<(), RepositoryError> {
        self.set_value(&variables::ROOT_SNAPSHOT, uuid, Key::RootSnapshot)
    }

    /* ↓↓↓ Hash Files ↓↓↓ */

    pub fn set_hash_file_header(&mut self, header: &HashFileHeader) -> Result<(), RepositoryError> {
        self.set_value(
            &variables::file_header_key(&header.file_id.bytes()),
            header,
            Key::HashFileHeader {
                file: header.file_id,
            },
        )
    }

    pub fn set_file_block(
        &mut self,
        file: &FileId,
        block_index: u64,
        hash: &ContentHash,
    ) -> Result<(), RepositoryError> {
        self.set_value(
            &variables::file_block_key(&file.bytes(), block_index),
            hash,
            Key::FileBlock {
                file: *file,
                block_index,
            },
        )
    }

    pub fn delete_file_block(&mut self, file: &FileId, block_index: u64) {
        self.0
            .delete(&variables::file_block_key(&file.bytes(), block_index))
    }

    pub fn set_file_parent(&mut self, file: &FileId, parent: &FileId) -> Result<(), RepositoryError> {
        self.set_value(
            &concat(&variables::LINEAGE, &file.bytes()),
            parent,
            Key::FileParent { file: *file },
        )
    }

    pub fn set_file_snapshot(
        &mut self,
        file: &FileId,
        snapshot: &EntityId,
    ) -> Result<(), RepositoryError> {
        self.set_value(
            &concat(&variables::FILE_TO_SNAPSHOT, &file.bytes()),
            snapshot,
            Key::FileSnapshot { file: *file },
        )
    }

    pub fn delete_file_snapshot(&mut self, file: &FileId) {
        self.0
            .delete(&concat(&variables::FILE_TO_SNAPSHOT, &file.bytes()))
    }

    /* ↓↓↓ Entities ↓↓↓ */

    pub fn set_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), RepositoryError> {
        self.set_value(
            &concat(&variables::SNAPSHOTS, &snapshot.uuid.bytes()),
            snapshot,
            Key::Snapshot {
                uuid: snapshot.uuid,
            },
        )
    }

    pub fn set_device(&mut self, device: &Device) -> Result<(), RepositoryError> {
        self.set_value(
            &concat(&variables::DEVICES, &device.uuid.bytes()),
            device,
            Key::Device { uuid: device.uuid },
        )
    }

    pub fn delete_device(&mut self, uuid: &EntityId) {
        self.0.delete(&concat(&variables::DEVICES, &uuid.bytes()))
    }

    fn set_value<T: BorshSerialize>(
        &mut self,
        raw_key: &[u8],
        value: &T,
        key: Key,
    ) -> Result<(), RepositoryError> {
        let bytes = value
            .try_to_vec()
            .map_err(|err| KVSetError::SerializeValueError { key, source: err })?;
        self.0.set(raw_key, &bytes);
        Ok(())
    }
}
