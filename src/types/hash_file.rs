/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Hash files: the versioned block-index to content-hash mappings that make up the copy-on-write
//! hierarchy.
//!
//! # Shape of a hash file
//!
//! A hash file is a [header](HashFileHeader) plus a partial mapping from block index to
//! [`ContentHash`]. Offsets passed to hash file operations are **byte** offsets. A byte offset `o`
//! addresses the block with index `o / block_size`, and is valid only if `o < size`.
//!
//! # Lifecycle
//!
//! A hash file is created writable, either as a [fork](HashFileHeader::fork) of another file or, for
//! the single ROOT file of a repository, [sealed from the start](HashFileHeader::root). Once
//! [sealed](HashFileHeader::seal), a file never becomes writable again.
//!
//! # Recursive lookups and the ancestry limit
//!
//! A lookup that misses in a file may continue in the file's parent, and so on up to the ROOT file
//! (which has no entries). Not every offset of a file may be resolved through its ancestors, however:
//! after a device is shrunk, hashes that its ancestors hold for offsets beyond the new size are stale,
//! even if the device is later grown back. Every header therefore carries an
//! [`ancestry_limit`](HashFileHeader::ancestry_limit): the byte length below which offsets may be
//! resolved through the parent. A recursive lookup stops as soon as the offset reaches the smallest
//! limit seen on its path.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{ContentHash, EntityId, FileId, FileVersion, NodeId, Timestamp};

/// Set of flags attached to a hash file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct HashFileFlags(u8);

impl HashFileFlags {
    /// The file has no real parent. Only set on the ROOT file.
    pub const ROOT: HashFileFlags = HashFileFlags(1);

    /// The file's valid range extends beyond the range it can resolve through its ancestors.
    pub const PARTIAL: HashFileFlags = HashFileFlags(1 << 1);

    /// The mapping is stored as block-indexed records.
    pub const BLOCKS: HashFileFlags = HashFileFlags(1 << 2);

    /// Create an empty set of flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Get the raw bits of this set of flags.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check whether every flag in `other` is also in this set.
    pub const fn contains(&self, other: HashFileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Add every flag in `other` to this set.
    pub fn insert(&mut self, other: HashFileFlags) {
        self.0 |= other.0
    }

    /// Remove every flag in `other` from this set.
    pub fn remove(&mut self, other: HashFileFlags) {
        self.0 &= !other.0
    }

    /// Add or remove the flags in `other` depending on `value`.
    pub fn set(&mut self, other: HashFileFlags, value: bool) {
        if value {
            self.insert(other)
        } else {
            self.remove(other)
        }
    }
}

/// Everything about a hash file except its mapping.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct HashFileHeader {
    /// Identity of this version of the file.
    pub file_id: FileId,
    /// The file this file was forked from. Equal to `file_id` for the ROOT file.
    pub parent_id: FileId,
    /// The device, snapshot, or repository on behalf of which this version was created.
    pub device_id: EntityId,
    /// The replica that created this version. It is the designated writer of the file while it is
    /// writable.
    pub node_id: NodeId,
    /// Logical byte length of the file.
    pub size: u64,
    /// Bytes per block.
    pub block_size: u32,
    /// Bytes per cluster. Always a multiple of `block_size`.
    pub cluster_size: u32,
    /// Bytes per stored content hash.
    pub hash_size: u32,
    pub flags: HashFileFlags,
    pub timestamp: Timestamp,
    pub version: FileVersion,
    pub writable: bool,
    /// Byte length below which offsets may be resolved through the parent. Never greater than `size`
    /// was at the moment the limit was last lowered, and never greater than the parent's size.
    pub ancestry_limit: u64,
}

impl HashFileHeader {
    /// Create the header of the ROOT file of the repository identified by `repository`.
    ///
    /// The ROOT file is its own parent, has size 0, carries the [`ROOT`](HashFileFlags::ROOT) flag,
    /// and is sealed from creation.
    pub fn root(
        repository: &EntityId,
        node_id: NodeId,
        block_size: u32,
        cluster_size: u32,
        hash_size: u32,
    ) -> HashFileHeader {
        let file_id = FileId::root(repository);
        let mut flags = HashFileFlags::empty();
        flags.insert(HashFileFlags::ROOT);
        flags.insert(HashFileFlags::BLOCKS);
        HashFileHeader {
            file_id,
            parent_id: file_id,
            device_id: *repository,
            node_id,
            size: 0,
            block_size,
            cluster_size,
            hash_size,
            flags,
            timestamp: Timestamp::now(),
            version: FileVersion::init(),
            writable: false,
            ancestry_limit: 0,
        }
    }

    /// Check whether this is the header of a ROOT file.
    pub fn is_root(&self) -> bool {
        self.flags.contains(HashFileFlags::ROOT) && self.parent_id == self.file_id
    }

    /// Create the header of a new writable file `new_file_id`, forked off this file on behalf of
    /// `owner` by `node_id`.
    ///
    /// The new file inherits this file's size, block size, cluster size, hash size and flags (minus
    /// [`ROOT`](HashFileFlags::ROOT)), starts at version 0, and can resolve every offset of its
    /// inherited size through this file.
    pub fn fork(&self, new_file_id: FileId, owner: EntityId, node_id: NodeId) -> HashFileHeader {
        let mut flags = self.flags;
        flags.remove(HashFileFlags::ROOT);
        flags.remove(HashFileFlags::PARTIAL);
        flags.insert(HashFileFlags::BLOCKS);
        HashFileHeader {
            file_id: new_file_id,
            parent_id: self.file_id,
            device_id: owner,
            node_id,
            size: self.size,
            block_size: self.block_size,
            cluster_size: self.cluster_size,
            hash_size: self.hash_size,
            flags,
            timestamp: Timestamp::now(),
            version: FileVersion::init(),
            writable: true,
            ancestry_limit: self.size,
        }
    }

    /// Seal this file. Returns whether the file was writable before the call.
    ///
    /// Sealing an already sealed file is a no-op.
    pub fn seal(&mut self) -> bool {
        let was_writable = self.writable;
        self.writable = false;
        was_writable
    }

    /// Change the size of this file in place.
    ///
    /// Lowers the ancestry limit to `new_size` when shrinking. Growing never raises it, so offsets
    /// between the old limit and the new size always miss in the ancestors.
    pub fn set_size(&mut self, new_size: u64) {
        self.size = new_size;
        self.ancestry_limit = self.ancestry_limit.min(new_size);
        self.flags
            .set(HashFileFlags::PARTIAL, self.ancestry_limit < self.size);
    }

    /// Increase the version of this file by one.
    pub fn bump_version(&mut self) {
        self.version += 1
    }

    pub fn check_writable(&self) -> Result<(), HashFileError> {
        if self.writable {
            Ok(())
        } else {
            Err(HashFileError::NotWritable {
                file: self.file_id,
            })
        }
    }

    /// Check that byte `offset` lies inside the file.
    pub fn check_offset(&self, offset: u64) -> Result<(), HashFileError> {
        if offset >= self.size || self.block_size == 0 {
            Err(HashFileError::OutOfRange {
                file: self.file_id,
                offset,
                size: self.size,
            })
        } else {
            Ok(())
        }
    }

    /// Get the index of the block that contains byte `offset`.
    ///
    /// Fails with [`OutOfRange`](HashFileError::OutOfRange) if `offset >= size`.
    pub fn block_index(&self, offset: u64) -> Result<u64, HashFileError> {
        self.check_offset(offset)?;
        Ok(offset / self.block_size as u64)
    }

    /// Check that `hash` is exactly `hash_size` bytes long.
    pub fn check_hash(&self, hash: &ContentHash) -> Result<(), HashFileError> {
        if hash.len() == self.hash_size as usize {
            Ok(())
        } else {
            Err(HashFileError::InvalidArgument {
                reason: "content hash length does not match the file's hash size",
            })
        }
    }

    /// Get the number of blocks needed to cover `size` bytes.
    pub fn block_count(&self) -> u64 {
        if self.block_size == 0 {
            0
        } else {
            self.size.div_ceil(self.block_size as u64)
        }
    }
}

/// A complete hash file: header plus mapping.
///
/// Inside a repository, hash files are stored field-by-field in the
/// [key-value store](crate::repository::pluggables::KVStore) and are never materialized whole. This
/// type is the materialized form, used when a whole file has to travel, for example in a
/// [`FetchFileResponse`](crate::reconciliation::messages::FetchFileResponse).
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct HashFile {
    pub header: HashFileHeader,
    entries: BTreeMap<u64, ContentHash>,
}

impl HashFile {
    /// Create an empty hash file with `header`.
    pub fn new(header: HashFileHeader) -> HashFile {
        HashFile {
            header,
            entries: BTreeMap::new(),
        }
    }

    /// Create a hash file from its `header` and its block index to hash `entries`.
    pub fn from_parts(header: HashFileHeader, entries: BTreeMap<u64, ContentHash>) -> HashFile {
        HashFile { header, entries }
    }

    pub fn file_id(&self) -> FileId {
        self.header.file_id
    }

    /// Get the block index to hash entries of this file.
    pub fn entries(&self) -> &BTreeMap<u64, ContentHash> {
        &self.entries
    }

    pub fn into_parts(self) -> (HashFileHeader, BTreeMap<u64, ContentHash>) {
        (self.header, self.entries)
    }

    /// Store `hash` as the content hash of the block containing byte `offset`, overwriting any hash
    /// stored there before, and bump the file's version.
    pub fn write_hash(&mut self, offset: u64, hash: ContentHash) -> Result<(), HashFileError> {
        self.header.check_writable()?;
        let index = self.header.block_index(offset)?;
        self.header.check_hash(&hash)?;
        self.entries.insert(index, hash);
        self.header.bump_version();
        Ok(())
    }

    /// Look up the content hash of the block containing byte `offset`.
    ///
    /// If `recursive`, misses continue in the ancestors of this file, which are resolved through
    /// `ancestors`. See [`lookup`] for the exact semantics.
    pub fn read_hash<R: HashFileResolver>(
        &self,
        offset: u64,
        recursive: bool,
        extended: bool,
        ancestors: &R,
    ) -> Result<Option<Lookup>, R::Error> {
        lookup(
            &WithFile {
                file: self,
                rest: ancestors,
            },
            &self.header,
            offset,
            recursive,
            extended,
        )
    }

    /// Seal this file. Sealing an already sealed file is a no-op.
    pub fn seal(&mut self) {
        self.header.seal();
    }

    /// Create a new, empty, writable file `new_file_id` whose parent is this file.
    pub fn fork(&self, new_file_id: FileId, owner: EntityId, node_id: NodeId) -> HashFile {
        HashFile::new(self.header.fork(new_file_id, owner, node_id))
    }
}

/// Result of a successful hash lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Returned by non-extended lookups.
    Hash(ContentHash),
    /// Returned by extended lookups.
    Extended(LookupResult),
}

impl Lookup {
    /// Get the content hash that was found, regardless of the kind of lookup.
    pub fn hash(&self) -> &ContentHash {
        match self {
            Lookup::Hash(hash) => hash,
            Lookup::Extended(result) => &result.hash,
        }
    }

    pub fn into_hash(self) -> ContentHash {
        match self {
            Lookup::Hash(hash) => hash,
            Lookup::Extended(result) => result.hash,
        }
    }

    /// Get the extended result, if this was an extended lookup.
    pub fn extended(&self) -> Option<&LookupResult> {
        match self {
            Lookup::Hash(_) => None,
            Lookup::Extended(result) => Some(result),
        }
    }
}

/// Where a content hash was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupResult {
    pub hash: ContentHash,
    /// The file whose mapping held the hash.
    pub source_file_id: FileId,
    /// Whether `source_file_id` is the file the lookup started from (as opposed to an ancestor).
    pub is_source_current: bool,
}

/// Access to hash files by id, as needed by [`lookup`].
pub trait HashFileResolver {
    type Error: From<HashFileError>;

    /// Get the header of `file`.
    fn header(&self, file: &FileId) -> Result<HashFileHeader, Self::Error>;

    /// Get the hash that `file`'s own mapping holds at `block_index`, without looking at ancestors.
    fn local_hash(&self, file: &FileId, block_index: u64)
        -> Result<Option<ContentHash>, Self::Error>;
}

/// Look up the content hash of the block containing byte `offset` of the file described by `start`.
///
/// ## Semantics
///
/// 1. If `offset >= start.size`, fails with [`OutOfRange`](HashFileError::OutOfRange). Offsets inside
///    the range but unmapped are legitimate misses and return `Ok(None)`.
/// 2. If `start`'s own mapping holds the block, returns it.
/// 3. Otherwise, if `recursive`, repeats step 2 against the parent, then the parent's parent, and so
///    on, stopping with `Ok(None)` at the ROOT file or as soon as `offset` reaches the smallest
///    [ancestry limit](HashFileHeader::ancestry_limit) seen so far.
///
/// If `extended`, the hash is returned as a [`LookupResult`] that says where it was found.
pub fn lookup<R: HashFileResolver>(
    resolver: &R,
    start: &HashFileHeader,
    offset: u64,
    recursive: bool,
    extended: bool,
) -> Result<Option<Lookup>, R::Error> {
    let index = start.block_index(offset)?;
    let mut bound = start.size;
    let mut current = start.clone();

    loop {
        if let Some(hash) = resolver.local_hash(&current.file_id, index)? {
            let found = if extended {
                Lookup::Extended(LookupResult {
                    hash,
                    source_file_id: current.file_id,
                    is_source_current: current.file_id == start.file_id,
                })
            } else {
                Lookup::Hash(hash)
            };
            return Ok(Some(found));
        }

        if !recursive || current.is_root() || current.parent_id == current.file_id {
            return Ok(None);
        }

        bound = bound.min(current.ancestry_limit);
        if offset >= bound {
            return Ok(None);
        }

        current = resolver.header(&current.parent_id)?;
    }
}

/// Resolver that answers for `file` itself and delegates every other file to `rest`.
struct WithFile<'a, R: HashFileResolver> {
    file: &'a HashFile,
    rest: &'a R,
}

impl<R: HashFileResolver> HashFileResolver for WithFile<'_, R> {
    type Error = R::Error;

    fn header(&self, file: &FileId) -> Result<HashFileHeader, Self::Error> {
        if *file == self.file.header.file_id {
            Ok(self.file.header.clone())
        } else {
            self.rest.header(file)
        }
    }

    fn local_hash(
        &self,
        file: &FileId,
        block_index: u64,
    ) -> Result<Option<ContentHash>, Self::Error> {
        if *file == self.file.header.file_id {
            Ok(self.file.entries.get(&block_index).cloned())
        } else {
            self.rest.local_hash(file, block_index)
        }
    }
}

/// A set of materialized hash files resolves ancestry by itself.
impl HashFileResolver for BTreeMap<FileId, HashFile> {
    type Error = HashFileError;

    fn header(&self, file: &FileId) -> Result<HashFileHeader, Self::Error> {
        self.get(file)
            .map(|hash_file| hash_file.header.clone())
            .ok_or(HashFileError::UnknownFile { file: *file })
    }

    fn local_hash(
        &self,
        file: &FileId,
        block_index: u64,
    ) -> Result<Option<ContentHash>, Self::Error> {
        self.get(file)
            .map(|hash_file| hash_file.entries.get(&block_index).cloned())
            .ok_or(HashFileError::UnknownFile { file: *file })
    }
}

/// Resolver for files that are looked up without any ancestors available. Every ancestor access
/// fails with [`UnknownFile`](HashFileError::UnknownFile).
pub struct Detached;

impl HashFileResolver for Detached {
    type Error = HashFileError;

    fn header(&self, file: &FileId) -> Result<HashFileHeader, Self::Error> {
        Err(HashFileError::UnknownFile { file: *file })
    }

    fn local_hash(&self, file: &FileId, _: u64) -> Result<Option<ContentHash>, Self::Error> {
        Err(HashFileError::UnknownFile { file: *file })
    }
}

/// Error when operating on a single hash file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashFileError {
    /// A write was attempted on a sealed file.
    NotWritable { file: FileId },

    /// An offset at or beyond the file's size was accessed.
    OutOfRange { file: FileId, offset: u64, size: u64 },

    InvalidArgument { reason: &'static str },

    /// A lookup needed a file that the resolver does not know.
    UnknownFile { file: FileId },
}
