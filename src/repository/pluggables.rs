//! Traits for pluggable repository persistence.

use std::{collections::BTreeMap, fmt::Display};

use borsh::BorshDeserialize;

use crate::types::{
    data_types::{ContentHash, EntityId, FileId, NodeId},
    hash_file::HashFileHeader,
    lineage::{Device, Snapshot},
};

use super::variables::{self, concat};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;
    type View<'a>: 'a + KVGet;

    fn write(&mut self, wb: Self::WriteBatch);
    fn clear(&mut self);

    /// Get a read-only view of the store that does not change while it is alive.
    fn view<'b>(&'b self) -> Self::View<'_>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Get every key-value pair whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;

    /* ↓↓↓ Identity ↓↓↓ */

    fn repository_id(&self) -> Result<Option<EntityId>, KVGetError> {
        get_value(self, &variables::REPOSITORY_ID, Key::RepositoryId)
    }

    fn owner_id(&self) -> Result<Option<String>, KVGetError> {
        get_value(self, &variables::OWNER_ID, Key::OwnerId)
    }

    fn node_id(&self) -> Result<Option<NodeId>, KVGetError> {
        get_value(self, &variables::NODE_ID, Key::NodeId)
    }

    fn root_snapshot(&self) -> Result<Option<EntityId>, KVGetError> {
        get_value(self, &variables::ROOT_SNAPSHOT, Key::RootSnapshot)
    }

    /* ↓↓↓ Hash Files ↓↓↓ */

    fn hash_file_header(&self, file: &FileId) -> Result<Option<HashFileHeader>, KVGetError> {
        get_value(
            self,
            &variables::file_header_key(&file.bytes()),
            Key::HashFileHeader { file: *file },
        )
    }

    fn file_block(
        &self,
        file: &FileId,
        block_index: u64,
    ) -> Result<Option<ContentHash>, KVGetError> {
        get_value(
            self,
            &variables::file_block_key(&file.bytes(), block_index),
            Key::FileBlock {
                file: *file,
                block_index,
            },
        )
    }

    /// Get every entry of `file`'s own mapping.
    fn file_blocks(&self, file: &FileId) -> Result<BTreeMap<u64, ContentHash>, KVGetError> {
        let prefix = variables::file_blocks_prefix(&file.bytes());
        let mut entries = BTreeMap::new();
        for (key, value) in self.scan_prefix(&prefix) {
            let block_index = u64::from_be_bytes(
                key[prefix.len()..]
                    .try_into()
                    .map_err(|_| KVGetError::MalformedKey {
                        key: Key::FileBlocks { file: *file },
                    })?,
            );
            let hash = deserialize_value(
                &value,
                Key::FileBlock {
                    file: *file,
                    block_index,
                },
            )?;
            entries.insert(block_index, hash);
        }
        Ok(entries)
    }

    fn file_parent(&self, file: &FileId) -> Result<Option<FileId>, KVGetError> {
        get_value(
            self,
            &concat(&variables::LINEAGE, &file.bytes()),
            Key::FileParent { file: *file },
        )
    }

    /// Get the ids of every hash file in the repository, in ascending order.
    fn file_ids(&self) -> Result<Vec<FileId>, KVGetError> {
        self.scan_prefix(&variables::LINEAGE)
            .into_iter()
            .map(|(key, _)| {
                key[variables::LINEAGE.len()..]
                    .try_into()
                    .map(FileId::new)
                    .map_err(|_| KVGetError::MalformedKey { key: Key::Lineage })
            })
            .collect()
    }

    fn file_snapshot(&self, file: &FileId) -> Result<Option<EntityId>, KVGetError> {
        get_value(
            self,
            &concat(&variables::FILE_TO_SNAPSHOT, &file.bytes()),
            Key::FileSnapshot { file: *file },
        )
    }

    /* ↓↓↓ Entities ↓↓↓ */

    fn snapshot(&self, uuid: &EntityId) -> Result<Option<Snapshot>, KVGetError> {
        get_value(
            self,
            &concat(&variables::SNAPSHOTS, &uuid.bytes()),
            Key::Snapshot { uuid: *uuid },
        )
    }

    /// Get every snapshot ever created, including deleted ones.
    fn snapshots(&self) -> Result<Vec<Snapshot>, KVGetError> {
        self.scan_prefix(&variables::SNAPSHOTS)
            .into_iter()
            .map(|(_, value)| deserialize_value(&value, Key::Snapshots))
            .collect()
    }

    fn device(&self, uuid: &EntityId) -> Result<Option<Device>, KVGetError> {
        get_value(
            self,
            &concat(&variables::DEVICES, &uuid.bytes()),
            Key::Device { uuid: *uuid },
        )
    }

    fn devices(&self) -> Result<Vec<Device>, KVGetError> {
        self.scan_prefix(&variables::DEVICES)
            .into_iter()
            .map(|(_, value)| deserialize_value(&value, Key::Devices))
            .collect()
    }
}

/// A shared reference to a readable store is itself a readable store.
impl<G: KVGet + ?Sized> KVGet for &G {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        (**self).scan_prefix(prefix)
    }
}

fn get_value<G: KVGet + ?Sized, T: BorshDeserialize>(
    kv: &G,
    raw_key: &[u8],
    key: Key,
) -> Result<Option<T>, KVGetError> {
    match kv.get(raw_key) {
        Some(bytes) => Ok(Some(deserialize_value(&bytes, key)?)),
        None => Ok(None),
    }
}

fn deserialize_value<T: BorshDeserialize>(bytes: &[u8], key: Key) -> Result<T, KVGetError> {
    T::deserialize(&mut &*bytes).map_err(|err| KVGetError::DeserializeValueError { key, source: err })
}

#[derive(Debug)]
pub enum KVGetError {
    DeserializeValueError {
        key: Key,
        source: std::io::Error,
    },
    ValueExpectedButNotFound {
        key: Key,
    },
    /// A key returned by a prefix scan does not have the length its variable prescribes.
    MalformedKey {
        key: Key,
    },
}

impl Display for KVGetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KVGetError::DeserializeValueError { key, source } => {
                write!(f, "Failed to deserialize {}: {}", key, source)
            }
            KVGetError::ValueExpectedButNotFound { key } => {
                write!(f, "Expected {} but found nothing", key)
            }
            KVGetError::MalformedKey { key } => write!(f, "Malformed key in {}", key),
        }
    }
}

#[derive(Debug)]
pub enum Key {
    RepositoryId,
    OwnerId,
    NodeId,
    RootSnapshot,
    HashFileHeader { file: FileId },
    FileBlock { file: FileId, block_index: u64 },
    FileBlocks { file: FileId },
    FileParent { file: FileId },
    Lineage,
    FileSnapshot { file: FileId },
    Snapshot { uuid: EntityId },
    Snapshots,
    Device { uuid: EntityId },
    Devices,
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            &Key::RepositoryId => write!(f, "Repository Id"),
            &Key::OwnerId => write!(f, "Owner Id"),
            &Key::NodeId => write!(f, "Node Id"),
            &Key::RootSnapshot => write!(f, "Root Snapshot"),
            &Key::HashFileHeader { file } => write!(f, "Hash File Header for file {}", file),
            &Key::FileBlock { file, block_index } => {
                write!(f, "Block {} of file {}", block_index, file)
            }
            &Key::FileBlocks { file } => write!(f, "Blocks of file {}", file),
            &Key::FileParent { file } => write!(f, "Parent of file {}", file),
            &Key::Lineage => write!(f, "Lineage"),
            &Key::FileSnapshot { file } => write!(f, "Snapshot of file {}", file),
            &Key::Snapshot { uuid } => write!(f, "Snapshot {}", uuid),
            &Key::Snapshots => write!(f, "Snapshots"),
            &Key::Device { uuid } => write!(f, "Device {}", uuid),
            &Key::Devices => write!(f, "Devices"),
        }
    }
}

#[derive(Debug)]
pub enum KVSetError {
    SerializeValueError { key: Key, source: std::io::Error },
}

impl Display for KVSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KVSetError::SerializeValueError { key, source } => {
                write!(f, "Failed to serialize {}: {}", key, source)
            }
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}
