/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each repository variable is stored in the user-provided key-value
//! store.
//!
//! # List of State Variables
//!
//! ## Identity
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Repository Id|[`EntityId`](crate::types::data_types::EntityId)|The id of the repository. Identical on every replica.|
//! |Owner Id|[`String`]|The name of the owner of the repository.|
//! |Node Id|[`NodeId`](crate::types::data_types::NodeId)|The id of the local replica. Different on every replica.|
//! |Root Snapshot|[`EntityId`](crate::types::data_types::EntityId)|The id of the root snapshot.|
//!
//! ## Hash Files
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Hash Files|[`FileId`](crate::types::data_types::FileId) -> [`HashFile`](crate::types::hash_file::HashFile)|Every hash file of the repository, stored field by field as described [below](#hash-files-1).|
//! |Lineage|[`FileId`](crate::types::data_types::FileId) -> [`FileId`](crate::types::data_types::FileId)|Mapping from every file to its parent file. The ROOT file maps to itself.|
//! |File to Snapshot|[`FileId`](crate::types::data_types::FileId) -> [`EntityId`](crate::types::data_types::EntityId)|Mapping from every file wrapped by a non-deleted snapshot to that snapshot.|
//!
//! ## Entities
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Snapshots|[`EntityId`](crate::types::data_types::EntityId) -> [`Snapshot`](crate::types::lineage::Snapshot)|Every snapshot ever created, including deleted ones.|
//! |Devices|[`EntityId`](crate::types::data_types::EntityId) -> [`Device`](crate::types::lineage::Device)|Every live device.|
//!
//! # Persistence of state variables
//!
//! Single values are Borsh-serialized and stored under their one-byte constant key. Mappings are
//! stored under the concatenation of the variable's one-byte prefix and the raw bytes of the mapping's
//! key (not its Borsh serialization), so that every key of a mapping has the same length and a prefix
//! scan over the variable's prefix returns exactly the mapping's entries.
//!
//! ## Hash files
//!
//! A hash file is stored in two parts:
//! 1. Its header, at `HASH_FILES` + `file_id` + [`FILE_HEADER`].
//! 2. Each of its entries, at `HASH_FILES` + `file_id` + [`FILE_BLOCKS`] + `block_index`, where the
//!    block index is encoded as 8 big-endian bytes. Big-endian encoding makes a prefix scan over
//!    `HASH_FILES` + `file_id` + `FILE_BLOCKS` return the entries in ascending block index order.
//!
//! Unmapped blocks have no key.

// State variables
pub const REPOSITORY_ID: [u8; 1] = [0];
pub const OWNER_ID: [u8; 1] = [1];
pub const NODE_ID: [u8; 1] = [2];
pub const ROOT_SNAPSHOT: [u8; 1] = [3];
pub const HASH_FILES: [u8; 1] = [4];
pub const LINEAGE: [u8; 1] = [5];
pub const FILE_TO_SNAPSHOT: [u8; 1] = [6];
pub const SNAPSHOTS: [u8; 1] = [7];
pub const DEVICES: [u8; 1] = [8];

// Fields of HashFile
pub const FILE_HEADER: [u8; 1] = [0];
pub const FILE_BLOCKS: [u8; 1] = [1];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}

/// Get the key prefix under which every entry of `file` is stored.
pub fn file_blocks_prefix(file: &[u8; 32]) -> Vec<u8> {
    concat(&concat(&HASH_FILES, file), &FILE_BLOCKS)
}

/// Get the key of the entry of `file` at `block_index`.
pub fn file_block_key(file: &[u8; 32], block_index: u64) -> Vec<u8> {
    concat(&file_blocks_prefix(file), &block_index.to_be_bytes())
}

/// Get the key of the header of `file`.
pub fn file_header_key(file: &[u8; 32]) -> Vec<u8> {
    concat(&concat(&HASH_FILES, file), &FILE_HEADER)
}
