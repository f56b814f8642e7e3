/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::AddAssign,
    time::SystemTime,
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::crypto_primitives::{CryptoHasher, Digest, OsRng, RngCore};

/// 16-byte identifier of a business entity: a repository, a [`Snapshot`](super::lineage::Snapshot),
/// or a [`Device`](super::lineage::Device).
///
/// Entity ids are chosen by the caller that creates the entity (usually the distributed transaction
/// coordinator, so that every replica applies the create with the same id). [`random`](Self::random)
/// is provided for callers that do not have an id scheme of their own.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct EntityId([u8; 16]);

impl EntityId {
    /// Create a new `EntityId` wrapping `bytes`.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh `EntityId` from the operating system's random number generator.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the inner `[u8; 16]` value of this `EntityId`.
    pub const fn bytes(&self) -> [u8; 16] {
        self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl Debug for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// 32-byte identifier of one version of a hash file.
///
/// # Derivation
///
/// File ids are never chosen freely. Every replica that applies the same sequence of create,
/// snapshot, clone, and resize operations must end up with the same file ids, otherwise the
/// [reconciliation](crate::reconciliation) protocol could not compare versions of "the same" file.
/// Therefore:
/// 1. The ROOT file's id is [`root`](Self::root), a SHA256 hash over the repository's id.
/// 2. Every other file's id is [`derive`](Self::derive)-d from the entity that owns the new file and
///    the file it was forked from.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct FileId([u8; 32]);

impl FileId {
    /// Create a new `FileId` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the id of the ROOT file of the repository identified by `repository`.
    pub fn root(repository: &EntityId) -> Self {
        let mut hasher = CryptoHasher::new();
        hasher.update(b"root");
        hasher.update(repository.bytes());
        Self(hasher.finalize().into())
    }

    /// Get the id of the file that `owner` forks off `source`.
    pub fn derive(owner: &EntityId, source: &FileId) -> Self {
        let mut hasher = CryptoHasher::new();
        hasher.update(b"fork");
        hasher.update(owner.bytes());
        hasher.update(source.bytes());
        Self(hasher.finalize().into())
    }

    /// Get the inner `[u8; 32]` value of this `FileId`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl Debug for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// 32-byte identifier of a repository replica (a "node").
///
/// `NodeId`s are totally ordered by their bytes. The reconciliation protocol uses this order to break
/// ties deterministically between peers that report the same version of a file.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Create a new `NodeId` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `NodeId`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// Content-address of a block payload in the [block store](crate::block_store::BlockStore).
///
/// The repository treats content hashes as opaque keys. The only property it checks is that every hash
/// written into a hash file is exactly [`hash_size`](super::hash_file::HashFileHeader::hash_size) bytes
/// long.
#[derive(Clone, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    /// Create a new `ContentHash` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Compute the content hash of `data`: its SHA256 digest truncated to `hash_size` bytes.
    ///
    /// `hash_size` values larger than 32 are capped at 32.
    pub fn digest(data: &[u8], hash_size: u32) -> Self {
        let digest: [u8; 32] = CryptoHasher::digest(data).into();
        let len = (hash_size as usize).min(digest.len());
        Self(digest[..len].to_vec())
    }

    /// Get a reference to the inner bytes of this `ContentHash`.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the number of bytes in this `ContentHash`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this `ContentHash` is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl Debug for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// Version counter of a hash file. Starts at 0 and increases by 1 on every persisted mutation of the
/// file.
///
/// Versions are only ever compared between replicas of the same file id, never between different files.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct FileVersion(u64);

impl FileVersion {
    /// Create a new `FileVersion` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the initial `FileVersion`, which is 0.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the inner `u64` of this `FileVersion`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for FileVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for FileVersion {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

/// Milliseconds since the Unix Epoch.
///
/// Timestamps are only meaningful for ordering within a single node.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new `Timestamp` wrapping `millis`.
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current time as a `Timestamp`. Times before the Unix Epoch are clamped to 0.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Get the inner `u64` value of this `Timestamp`.
    pub const fn millis(&self) -> u64 {
        self.0
    }
}

fn write_hex(f: &mut Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}
